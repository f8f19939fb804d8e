use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::content::extension_for_mime;
use common::storage::{ContentHash, ObjectKey, ObjectOrigin, ObjectStore, StorageError, StoredObject};

/// Where an artifact ended up.
pub enum Artifact {
    /// Stored durably; `url` is public.
    Stored(StoredObject),
    /// The store was unavailable; the bytes travel inline as a data URL.
    Inline {
        data_url: String,
        size: u64,
        content_hash: ContentHash,
    },
}

impl Artifact {
    pub fn url(&self) -> &str {
        match self {
            Self::Stored(obj) => &obj.url,
            Self::Inline { data_url, .. } => data_url,
        }
    }

    pub fn storage_key(&self) -> Option<&str> {
        match self {
            Self::Stored(obj) => Some(&obj.key),
            Self::Inline { .. } => None,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Stored(obj) => obj.size,
            Self::Inline { size, .. } => *size,
        }
    }

    pub fn content_hash(&self) -> &ContentHash {
        match self {
            Self::Stored(obj) => &obj.content_hash,
            Self::Inline { content_hash, .. } => content_hash,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// Store bytes under a fresh `{origin}/{uuid}.{ext}` key.
pub async fn store(
    objects: &dyn ObjectStore,
    origin: ObjectOrigin,
    data: &[u8],
    mime: &str,
) -> Result<StoredObject, StorageError> {
    let key = ObjectKey::generate(origin, extension_for_mime(mime));
    objects.put(&key, data, mime).await
}

/// Store bytes, falling back to an inline data URL when the store fails.
pub async fn store_or_inline(
    objects: &dyn ObjectStore,
    origin: ObjectOrigin,
    data: &[u8],
    mime: &str,
) -> Artifact {
    match store(objects, origin, data, mime).await {
        Ok(obj) => Artifact::Stored(obj),
        Err(e) => {
            tracing::warn!(backend = objects.backend(), error = %e, "Upload failed, using inline data URL");
            Artifact::Inline {
                data_url: data_url(mime, data),
                size: data.len() as u64,
                content_hash: ContentHash::compute(data),
            }
        }
    }
}

pub fn data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}
