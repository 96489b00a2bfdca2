use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Local audit trail of produced content identifiers.
///
/// For every produced CID a small pointer file `{cid}.txt` containing the CID
/// string is written under the archive directory, independent of the graph
/// database. Writes are idempotent; a pointer for an already-archived CID is
/// simply rewritten with identical content.
#[derive(Clone)]
pub struct PointerArchive {
    base: PathBuf,
}

impl PointerArchive {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Persist a pointer file for the given CID.
    pub async fn record(&self, cid: &str) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.base).await?;
        let path = self.base.join(format!("{cid}.txt"));
        tokio::fs::write(&path, cid).await?;
        Ok(())
    }

    /// Check whether a pointer file exists for the given CID.
    pub async fn contains(&self, cid: &str) -> bool {
        tokio::fs::try_exists(self.base.join(format!("{cid}.txt")))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_pointer_file_with_cid_content() {
        let dir = tempdir().expect("tempdir");
        let archive = PointerArchive::new(dir.path());

        archive.record("abc123").await.expect("record");

        let content = tokio::fs::read_to_string(dir.path().join("abc123.txt"))
            .await
            .expect("pointer file readable");
        assert_eq!(content, "abc123");
        assert!(archive.contains("abc123").await);
        assert!(!archive.contains("def456").await);
    }

    #[tokio::test]
    async fn recording_twice_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let archive = PointerArchive::new(dir.path());

        archive.record("abc123").await.expect("first record");
        archive.record("abc123").await.expect("second record");

        let entries = std::fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(entries, 1);
    }
}
