use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Directory chooser. `None` means the user dismissed it.
#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    async fn browse(&self, initial: &Path) -> Option<PathBuf>;
}
