//! Decides whether an archive was already decompiled by a previous run.

use std::path::Path;

use tracing::trace;
use walkdir::WalkDir;

use crate::state_machine::Item;

/// Looks for decompiled sources under `output_root/<id>`.
#[derive(Debug, Clone)]
pub struct CompletionOracle {
    artifact_extension: String,
}

impl CompletionOracle {
    pub fn new(artifact_extension: impl Into<String>) -> Self {
        Self {
            artifact_extension: artifact_extension.into(),
        }
    }

    /// True iff the item's output directory holds at least one artifact file,
    /// at any depth. Missing, empty, or artifact-free directories return false
    /// so partially written output gets redone. Unreadable entries are ignored.
    pub fn is_already_done(&self, item: &Item, output_root: &Path) -> bool {
        let dir = item.output_dir(output_root);
        if !dir.is_dir() {
            return false;
        }

        let found = WalkDir::new(&dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .any(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(&self.artifact_extension))
            });

        trace!(item = %item.id, dir = %dir.display(), found, "checked prior output");
        found
    }
}

impl Default for CompletionOracle {
    fn default() -> Self {
        Self::new("java")
    }
}
