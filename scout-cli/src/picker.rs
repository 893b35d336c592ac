use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use scout_core::picker::DirectoryPicker;

/// Asks for a directory on the terminal. An empty answer cancels; a relative
/// answer is resolved against the initial directory.
pub struct PromptPicker;

#[async_trait]
impl DirectoryPicker for PromptPicker {
    async fn browse(&self, initial: &Path) -> Option<PathBuf> {
        let mut stderr = tokio::io::stderr();
        let prompt = format!("Select directory [{}]: ", initial.display());
        stderr.write_all(prompt.as_bytes()).await.ok()?;
        stderr.flush().await.ok()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .ok()?;
        resolve(initial, line.trim())
    }
}

fn resolve(initial: &Path, answer: &str) -> Option<PathBuf> {
    if answer.is_empty() {
        return None;
    }
    let path = initial.join(answer);
    if path.is_dir() {
        Some(path)
    } else {
        tracing::warn!(path = %path.display(), "not a directory");
        None
    }
}
