use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

/// Public URL prefix under which stored uploads are referenced and served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

pub const SUBMISSION_PREFIX: &str = "";
pub const REPLY_PREFIX: &str = "reply_";

const DEFAULT_EXTENSION: &str = "jpg";
const MAX_EXTENSION_LEN: usize = 8;

#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Persists `bytes` under a fresh name and returns its reference (`/uploads/<name>`).
    async fn store(&self, prefix: &str, extension: &str, bytes: Vec<u8>) -> Result<String>;

    async fn read(&self, reference: &str) -> Result<Option<Vec<u8>>>;

    /// Removing a reference that does not exist is not an error.
    async fn remove(&self, reference: &str) -> Result<()>;

    async fn exists(&self, reference: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<String>>;
}

/// Stored file name for a reference, or `None` when it does not point at a plain file name.
pub fn file_name_of(reference: &str) -> Option<&str> {
    let name = reference
        .strip_prefix(UPLOADS_URL_PREFIX)
        .unwrap_or(reference);
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('.');
    valid.then_some(name)
}

pub fn reference_for(file_name: &str) -> String {
    format!("{UPLOADS_URL_PREFIX}{file_name}")
}

/// Lower-cased alphanumeric extension taken from an uploaded file name, `jpg` otherwise.
pub fn extension_from_filename(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create upload directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        match file_name_of(reference) {
            Some(name) => Ok(self.root.join(name)),
            None => bail!("invalid upload reference {reference:?}"),
        }
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn store(&self, prefix: &str, extension: &str, bytes: Vec<u8>) -> Result<String> {
        let file_name = format!("{prefix}{}.{extension}", Uuid::new_v4());
        let path = self.resolve(&file_name)?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write upload {}", path.display()))?;
        Ok(reference_for(&file_name))
    }

    async fn read(&self, reference: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(reference)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read upload {}", path.display()))
            }
        }
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let path = self.resolve(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove upload {}", path.display()))
            }
        }
    }

    async fn exists(&self, reference: &str) -> Result<bool> {
        let path = self.resolve(reference)?;
        fs::try_exists(&path)
            .await
            .with_context(|| format!("failed to inspect upload {}", path.display()))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("failed to list {}", self.root.display()))?;
        let mut references = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().and_then(file_name_of) {
                references.push(reference_for(name));
            }
        }
        references.sort();
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_file_names_from_references() {
        assert_eq!(file_name_of("/uploads/abc.jpg"), Some("abc.jpg"));
        assert_eq!(file_name_of("abc.jpg"), Some("abc.jpg"));
        assert_eq!(file_name_of("/uploads/../etc/passwd"), None);
        assert_eq!(file_name_of("/uploads/.."), None);
        assert_eq!(file_name_of("/uploads/"), None);
    }

    #[test]
    fn sanitizes_extensions() {
        assert_eq!(extension_from_filename(Some("photo.PNG")), "png");
        assert_eq!(extension_from_filename(Some("photo")), "jpg");
        assert_eq!(extension_from_filename(Some("x.j$g")), "jpg");
        assert_eq!(extension_from_filename(None), "jpg");
    }

    #[tokio::test]
    async fn stores_reads_and_removes_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path()).await?;

        let reference = storage
            .store(REPLY_PREFIX, "png", b"image".to_vec())
            .await?;
        assert!(reference.starts_with("/uploads/reply_"));
        assert!(reference.ends_with(".png"));
        assert!(storage.exists(&reference).await?);
        assert_eq!(storage.read(&reference).await?, Some(b"image".to_vec()));
        assert_eq!(storage.list().await?, vec![reference.clone()]);

        storage.remove(&reference).await?;
        assert!(!storage.exists(&reference).await?);
        assert_eq!(storage.read(&reference).await?, None);

        storage.remove(&reference).await?;
        Ok(())
    }

    #[tokio::test]
    async fn refuses_references_outside_the_root() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path()).await?;
        assert!(storage.remove("/uploads/../secret").await.is_err());
        Ok(())
    }
}
