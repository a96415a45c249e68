use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::{is_valid_image_id, new_image_id, CachedImage};
use crate::error::ProxyError;

const KNOWN_TYPES: [(&str, &str); 6] = [
    ("image/png", "png"),
    ("image/jpeg", "jpeg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
];
const FALLBACK_EXTENSION: &str = "bin";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const CONTENT_TYPE_EXTENSION: &str = "type";

/// Filesystem image store writing `{dir}/{id}.{ext}`.
///
/// Known image types are recovered from the extension. Any other content
/// type is stored as `{id}.bin` with the original type in `{id}.type`.
/// Files are never removed by the proxy.
#[derive(Debug)]
pub struct DiskImageCache {
    dir: PathBuf,
}

/// Extension for a content type the cache can recover from the file name alone.
fn extension_for(content_type: &str) -> Option<&'static str> {
    KNOWN_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

fn content_type_for(extension: &str) -> Option<&'static str> {
    KNOWN_TYPES
        .iter()
        .find(|(_, ext)| *ext == extension)
        .map(|(mime, _)| *mime)
}

fn write_error(path: &Path, err: &std::io::Error) -> ProxyError {
    ProxyError::Internal(format!("Failed to write {}: {err}", path.display()))
}

impl DiskImageCache {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Write the image and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the directory or file cannot be written.
    pub async fn store(&self, bytes: Bytes, content_type: &str) -> Result<String, ProxyError> {
        let id = new_image_id();
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            ProxyError::Internal(format!(
                "Failed to create cache dir {}: {err}",
                self.dir.display()
            ))
        })?;

        let extension = match extension_for(content_type) {
            Some(extension) => extension,
            None => {
                // Written before the image so a visible `.bin` always has its type.
                let type_path = self.path_for(&id, CONTENT_TYPE_EXTENSION);
                tokio::fs::write(&type_path, content_type.as_bytes())
                    .await
                    .map_err(|err| write_error(&type_path, &err))?;
                FALLBACK_EXTENSION
            }
        };
        let path = self.path_for(&id, extension);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|err| write_error(&path, &err))?;
        tracing::debug!(path = %path.display(), size = bytes.len(), content_type, "stored generated image");
        Ok(id)
    }

    fn path_for(&self, id: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{id}.{extension}"))
    }

    async fn stored_content_type(&self, id: &str) -> Result<String, ProxyError> {
        let path = self.path_for(id, CONTENT_TYPE_EXTENSION);
        match tokio::fs::read_to_string(&path).await {
            Ok(content_type) if !content_type.trim().is_empty() => Ok(content_type),
            Ok(_) => Ok(FALLBACK_CONTENT_TYPE.to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(FALLBACK_CONTENT_TYPE.to_string())
            }
            Err(err) => Err(ProxyError::Internal(format!(
                "Failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Read an image back. Ids that are not minted by this cache are misses.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when an existing file cannot be read.
    pub async fn fetch(&self, id: &str) -> Result<Option<CachedImage>, ProxyError> {
        if !is_valid_image_id(id) {
            return Ok(None);
        }

        let extensions = KNOWN_TYPES
            .iter()
            .map(|(_, ext)| *ext)
            .chain(std::iter::once(FALLBACK_EXTENSION));
        for extension in extensions {
            let path = self.path_for(id, extension);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let content_type = match content_type_for(extension) {
                        Some(content_type) => content_type.to_string(),
                        None => self.stored_content_type(id).await?,
                    };
                    return Ok(Some(CachedImage {
                        id: id.to_string(),
                        bytes: Bytes::from(bytes),
                        content_type,
                    }));
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(ProxyError::Internal(format!(
                        "Failed to read {}: {err}",
                        path.display()
                    )));
                }
            }
        }
        Ok(None)
    }
}
