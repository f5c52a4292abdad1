pub mod provider;
pub mod local;
#[cfg(test)]
pub mod memory;

pub use provider::*;
pub use local::*;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, Result};

/// The artifacts kept for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Original,
    Thumbnail,
    Compressed,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Original,
        ArtifactKind::Thumbnail,
        ArtifactKind::Compressed,
    ];

    /// Directory the kind lives in
    pub fn namespace(&self) -> &'static str {
        match self {
            ArtifactKind::Original => "original",
            ArtifactKind::Thumbnail => "thumbnail",
            ArtifactKind::Compressed => "compressed",
        }
    }

    /// Derived kinds can always be rebuilt from the original
    pub fn is_derived(&self) -> bool {
        !matches!(self, ArtifactKind::Original)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "original" => Some(ArtifactKind::Original),
            "thumbnail" => Some(ArtifactKind::Thumbnail),
            "compressed" => Some(ArtifactKind::Compressed),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Identity of one image: its album plus the stored filename
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    album_id: i64,
    filename: String,
}

impl ResourceKey {
    pub fn new(album_id: i64, filename: impl Into<String>) -> Result<Self> {
        let filename = filename.into();
        if filename.is_empty()
            || filename.starts_with('.')
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(AppError::BadRequest(format!(
                "Invalid stored filename: {:?}",
                filename
            )));
        }
        Ok(Self { album_id, filename })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.album_id, self.filename)
    }
}

/// Artifact store: three parallel namespaces keyed by the same filename
#[derive(Clone)]
pub struct AssetStore {
    provider: Arc<dyn StorageProvider>,
}

impl AssetStore {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    pub fn local(root: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(LocalStorage::new(root)))
    }

    fn path(key: &ResourceKey, kind: ArtifactKind) -> String {
        format!("{}/{}", kind.namespace(), key.filename())
    }

    pub async fn exists(&self, key: &ResourceKey, kind: ArtifactKind) -> Result<bool> {
        self.provider.exists(&Self::path(key, kind)).await
    }

    /// Read an artifact; a missing one is `AppError::NotFound`
    pub async fn read(&self, key: &ResourceKey, kind: ArtifactKind) -> Result<Bytes> {
        self.provider.get(&Self::path(key, kind)).await
    }

    pub async fn write(&self, key: &ResourceKey, kind: ArtifactKind, data: Bytes) -> Result<()> {
        self.provider.put(&Self::path(key, kind), data).await
    }

    pub async fn delete(&self, key: &ResourceKey, kind: ArtifactKind) -> Result<()> {
        self.provider.delete(&Self::path(key, kind)).await
    }

    /// Remove every artifact kind for `key`
    pub async fn delete_all(&self, key: &ResourceKey) -> Result<()> {
        for kind in ArtifactKind::ALL {
            self.delete(key, kind).await?;
        }
        Ok(())
    }

    pub fn storage_type(&self) -> &'static str {
        self.provider.storage_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resource_key_rejects_path_segments() {
        assert!(ResourceKey::new(1, "a.jpg").is_ok());
        assert!(ResourceKey::new(1, "").is_err());
        assert!(ResourceKey::new(1, "../etc/passwd").is_err());
        assert!(ResourceKey::new(1, "sub/a.jpg").is_err());
        assert!(ResourceKey::new(1, ".hidden").is_err());
    }

    #[test]
    fn kind_parses_known_names_only() {
        assert_eq!(ArtifactKind::from_str("thumbnail"), Some(ArtifactKind::Thumbnail));
        assert_eq!(ArtifactKind::from_str("original"), Some(ArtifactKind::Original));
        assert_eq!(ArtifactKind::from_str("Thumbnail"), None);
        assert!(!ArtifactKind::Original.is_derived());
        assert!(ArtifactKind::Compressed.is_derived());
    }

    #[tokio::test]
    async fn kinds_share_filename_across_namespaces() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::local(dir.path());
        let key = ResourceKey::new(7, "20240101_photo.jpg").unwrap();

        store
            .write(&key, ArtifactKind::Original, Bytes::from_static(b"orig"))
            .await
            .unwrap();
        store
            .write(&key, ArtifactKind::Thumbnail, Bytes::from_static(b"thumb"))
            .await
            .unwrap();

        assert!(dir.path().join("original/20240101_photo.jpg").exists());
        assert!(dir.path().join("thumbnail/20240101_photo.jpg").exists());
        assert!(!store.exists(&key, ArtifactKind::Compressed).await.unwrap());

        store.delete_all(&key).await.unwrap();
        for kind in ArtifactKind::ALL {
            assert!(!store.exists(&key, kind).await.unwrap());
        }
    }
}
