use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::ItemState;
use crate::error::BatchError;

/// The result of one decompiler attempt. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { diagnostic: String },
    TimedOut,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Succeeded => write!(f, "succeeded"),
            TaskOutcome::Failed { .. } => write!(f, "failed"),
            TaskOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// One archive discovered in the input directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// File name without its extension, lossily decoded for display and
    /// ordering. The output subdirectory keeps the raw stem.
    pub id: String,
    pub source: PathBuf,
}

impl Item {
    pub fn from_path(path: &Path) -> Option<Self> {
        let id = path.file_stem()?.to_string_lossy().into_owned();
        Some(Self {
            id,
            source: path.to_path_buf(),
        })
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }

    /// `output_root/<stem>`, the directory the decompiler writes into.
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        match self.source.file_stem() {
            Some(stem) => output_root.join(stem),
            None => output_root.join(&self.id),
        }
    }
}

/// Lists the files directly under `dir` whose extension matches `extension`
/// (case-insensitive), sorted by identifier so runs are reproducible.
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<Item>, BatchError> {
    let mut items = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }
        match Item::from_path(&path) {
            Some(item) => items.push(item),
            None => warn!(path = %path.display(), "skipping input without a file name"),
        }
    }
    items.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.cmp(&b.source)));

    for pair in items.windows(2) {
        if pair[0].source.file_stem() == pair[1].source.file_stem() {
            warn!(
                item = %pair[1].id,
                first = %pair[0].source.display(),
                second = %pair[1].source.display(),
                "archives share an output directory"
            );
        }
    }
    Ok(items)
}

/// Tracks one item through the batch: its lifecycle state, how many attempts
/// it took and the last diagnostic the decompiler produced.
#[derive(Debug, Clone)]
pub struct ItemRun {
    pub item: Item,
    pub state: ItemState,
    pub state_history: Vec<ItemState>,
    pub attempts: u32,
    pub diagnostic: Option<String>,
    pub elapsed: Duration,
}

impl ItemRun {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            state: ItemState::Pending,
            state_history: Vec::new(),
            attempts: 0,
            diagnostic: None,
            elapsed: Duration::ZERO,
        }
    }
}
