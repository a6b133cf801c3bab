//! Poster files in app-private storage.
//!
//! A picked image is copied byte-for-byte into a dedicated `posters`
//! directory under a freshly generated name; the catalog only ever stores
//! the resulting path. All file work runs on the blocking thread pool, and
//! every failure degrades to `None`/`false` after being logged — a missing
//! or broken poster is never fatal to the flow that wanted it.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tokio::task;
use tracing::{debug, warn};
use uuid::Uuid;

/// Directory name posters live under.
const POSTERS_DIR: &str = "posters";

/// Copies picked images into private storage and hands back stable paths.
#[derive(Debug, Clone)]
pub struct PosterStore {
    dir: PathBuf,
}

impl PosterStore {
    /// Store posters under `<base>/posters`; the directory is created on
    /// first save.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            dir: base.into().join(POSTERS_DIR),
        }
    }

    /// Default base directory, next to the default database location:
    /// - Linux: ~/.local/share/cinelog
    /// - macOS: ~/Library/Application Support/cinelog
    /// - Windows: %APPDATA%\cinelog
    pub fn default_base() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .expect("could not determine user data directory");
        path.push("cinelog");
        path
    }

    /// Copy the image at `source` into the poster directory.
    ///
    /// Returns the absolute path of the new `poster_<id>.jpg` file, or
    /// `None` after logging if anything fails.
    pub async fn save(&self, source: &Path) -> Option<String> {
        let source = source.to_path_buf();
        let dir = self.dir.clone();
        let result = task::spawn_blocking(move || -> std::io::Result<PathBuf> {
            std::fs::create_dir_all(&dir)?;
            let dest = dir.join(format!("poster_{}.jpg", Uuid::new_v4()));
            std::fs::copy(&source, &dest)?;
            Ok(dest.canonicalize().unwrap_or(dest))
        })
        .await;
        match result {
            Ok(Ok(path)) => {
                debug!(path = %path.display(), "saved poster");
                Some(path.to_string_lossy().into_owned())
            }
            Ok(Err(err)) => {
                warn!("saving poster failed: {err}");
                None
            }
            Err(err) => {
                warn!("poster task failed: {err}");
                None
            }
        }
    }

    /// Remove the poster file at `path` if it exists.
    ///
    /// Returns whether a file was actually removed; errors are logged and
    /// reported as `false`.
    pub async fn delete(&self, path: &Path) -> bool {
        let path = path.to_path_buf();
        let result = task::spawn_blocking(move || -> std::io::Result<bool> {
            if !path.exists() {
                return Ok(false);
            }
            std::fs::remove_file(&path)?;
            Ok(true)
        })
        .await;
        match result {
            Ok(Ok(removed)) => removed,
            Ok(Err(err)) => {
                warn!("deleting poster failed: {err}");
                false
            }
            Err(err) => {
                warn!("poster task failed: {err}");
                false
            }
        }
    }

    /// Decode the poster at `path` for display.
    ///
    /// The format is sniffed from the file contents, so a poster whose
    /// source was not actually a JPEG still decodes. Returns `None` on any
    /// failure.
    pub async fn load(&self, path: &Path) -> Option<DynamicImage> {
        let path = path.to_path_buf();
        let result = task::spawn_blocking(move || -> image::ImageResult<DynamicImage> {
            image::ImageReader::open(&path)?
                .with_guessed_format()?
                .decode()
        })
        .await;
        match result {
            Ok(Ok(image)) => Some(image),
            Ok(Err(err)) => {
                warn!("loading poster failed: {err}");
                None
            }
            Err(err) => {
                warn!("poster task failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn save_copies_into_posters_directory() {
        let dir = tempfile::tempdir().unwrap();
        let picked = dir.path().join("picked.png");
        fs::write(&picked, b"not really an image").unwrap();

        let store = PosterStore::new(dir.path());
        let path = store.save(&picked).await.unwrap();

        assert!(path.contains(POSTERS_DIR));
        let name = Path::new(&path).file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("poster_") && name.ends_with(".jpg"));
        assert_eq!(fs::read(&path).unwrap(), b"not really an image");
    }

    #[tokio::test]
    async fn each_save_gets_a_fresh_name() {
        let dir = tempfile::tempdir().unwrap();
        let picked = dir.path().join("picked.png");
        fs::write(&picked, b"bytes").unwrap();

        let store = PosterStore::new(dir.path());
        let first = store.save(&picked).await.unwrap();
        let second = store.save(&picked).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn save_of_missing_source_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PosterStore::new(dir.path());
        assert!(store.save(&dir.path().join("nope.png")).await.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_file_was_removed() {
        let dir = tempfile::tempdir().unwrap();
        let picked = dir.path().join("picked.png");
        fs::write(&picked, b"bytes").unwrap();

        let store = PosterStore::new(dir.path());
        let saved = store.save(&picked).await.unwrap();
        let saved = Path::new(&saved);

        assert!(store.delete(saved).await);
        assert!(!saved.exists());
        assert!(!store.delete(saved).await);
    }

    #[tokio::test]
    async fn load_decodes_by_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let picked = dir.path().join("picked.png");
        image::RgbImage::new(4, 2)
            .save_with_format(&picked, image::ImageFormat::Png)
            .unwrap();

        let store = PosterStore::new(dir.path());
        // Stored under a .jpg name, but the bytes are PNG.
        let saved = store.save(&picked).await.unwrap();
        let decoded = store.load(Path::new(&saved)).await.unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }

    #[tokio::test]
    async fn load_of_garbage_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.jpg");
        fs::write(&garbage, b"definitely not an image").unwrap();

        let store = PosterStore::new(dir.path());
        assert!(store.load(&garbage).await.is_none());
        assert!(store.load(&dir.path().join("missing.jpg")).await.is_none());
    }
}
