use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::{Event, ItemState};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Decompiler not found: {}", .0.display())]
    ToolNotFound(PathBuf),

    #[error("Decompiler cannot be launched via {}: {reason}", .program.display())]
    ToolNotLaunchable { program: PathBuf, reason: String },

    #[error("Input directory does not exist: {}", .0.display())]
    InputDirNotFound(PathBuf),

    #[error("No .{extension} files found in {}", .dir.display())]
    NoInputs { dir: PathBuf, extension: String },

    #[error("Invalid transition for {item}: {event} while {from}")]
    InvalidTransition {
        item: String,
        from: ItemState,
        event: Event,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BatchError {
    /// Configuration errors abort the batch before any item runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BatchError::Config(_)
                | BatchError::ToolNotFound(_)
                | BatchError::ToolNotLaunchable { .. }
                | BatchError::InputDirNotFound(_)
                | BatchError::NoInputs { .. }
                | BatchError::Toml(_)
        )
    }
}
