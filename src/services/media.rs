//! Uploaded image storage
//!
//! Images are written under the media root with a random file name and
//! referenced in the database by their path relative to that root, e.g.
//! `images/profile/3f1c….png`. The image type is taken from the file's
//! leading bytes, never from the name or the declared content type.

use crate::config::MediaConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Sub-directory for post thumbnails
pub const THUMBNAIL_DIR: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Le fichier envoyé est vide.")]
    Empty,

    #[error("Téléversez une image valide (JPEG, PNG, GIF ou WebP).")]
    NotAnImage,

    #[error("Le fichier dépasse la taille maximale de {max_mb} Mo.")]
    TooLarge { max_mb: u64 },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Writes uploaded images below the media root
#[derive(Debug, Clone)]
pub struct MediaStore {
    config: MediaConfig,
}

impl MediaStore {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Store an image in `subdir` and return its media-relative path
    pub async fn save_image(&self, subdir: &str, data: &[u8]) -> Result<String, MediaError> {
        if data.is_empty() {
            return Err(MediaError::Empty);
        }
        if data.len() as u64 > self.config.max_file_size {
            return Err(MediaError::TooLarge {
                max_mb: self.config.max_file_size / 1024 / 1024,
            });
        }

        let mime_type = sniff_image_type(data).ok_or(MediaError::NotAnImage)?;
        if !self.config.is_type_allowed(mime_type) {
            return Err(MediaError::NotAnImage);
        }

        let dir = self.config.path.join(subdir);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create media directory {}", dir.display()))?;

        let file_name = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            self.config.get_extension(mime_type)
        );
        let file_path = dir.join(&file_name);
        fs::write(&file_path, data)
            .await
            .with_context(|| format!("Failed to write {}", file_path.display()))?;

        tracing::debug!("Stored upload {} ({} bytes)", file_path.display(), data.len());
        Ok(format!("{}/{}", subdir.trim_end_matches('/'), file_name))
    }

    /// Remove a previously stored file. Missing files are ignored, and
    /// paths that would leave the media root are refused.
    pub async fn remove(&self, relative: &str) {
        let Some(path) = self.resolve(relative) else {
            tracing::warn!("Refusing to remove media path {}", relative);
            return;
        };
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        safe.then(|| self.config.path.join(relative))
    }
}

/// MIME type of an image from its magic bytes
pub fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
