use std::fmt;

use super::error::StorageError;

const MAX_KEY_LEN: usize = 512;

/// Which top-level prefix an object is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOrigin {
    /// Produced by the image-generation endpoint.
    Generated,
    /// Supplied by a user.
    Uploaded,
}

impl ObjectOrigin {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Uploaded => "uploaded",
        }
    }
}

/// Relative location of an object, e.g. `uploaded/0190c3e2-7f4a-7b1c-9d7e-1f2a3b4c5d6e.png`.
///
/// Keys are `/`-separated segments of `[A-Za-z0-9._-]`. Empty segments, `..`,
/// and dot-prefixed segments are rejected, so a key can always be joined onto a
/// filesystem root safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        if raw.is_empty() {
            return Err(StorageError::InvalidKey("key cannot be empty".into()));
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey(format!(
                "key longer than {MAX_KEY_LEN} bytes"
            )));
        }
        for segment in raw.split('/') {
            if segment.is_empty() {
                return Err(StorageError::InvalidKey("empty path segment".into()));
            }
            if segment.starts_with('.') {
                return Err(StorageError::InvalidKey(
                    "segments may not start with '.'".into(),
                ));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            {
                return Err(StorageError::InvalidKey(format!(
                    "unsupported character in segment '{segment}'"
                )));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Fresh time-ordered key under the origin's prefix.
    pub fn generate(origin: ObjectOrigin, extension: &str) -> Self {
        Self(format!(
            "{}/{}.{}",
            origin.prefix(),
            uuid::Uuid::now_v7(),
            extension
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Extension of the final segment, if any.
    pub fn extension(&self) -> Option<&str> {
        self.0
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
