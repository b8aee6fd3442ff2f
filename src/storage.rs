//! Layout of the shared data directory.
//!
//! ```text
//! data/
//!   inputs/   uploaded images and masks
//!   outputs/  generated images, served under /data/outputs
//!   work/     intermediate control and mask images
//! ```

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use uuid::Uuid;

/// File naming and persistence under a data root.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.root.join("inputs")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Create the data directory tree if missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.inputs_dir(), self.outputs_dir(), self.work_dir()] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn input_path(&self, request_id: &Uuid) -> PathBuf {
        self.inputs_dir().join(format!("{request_id}_input.png"))
    }

    pub fn mask_path(&self, request_id: &Uuid) -> PathBuf {
        self.inputs_dir().join(format!("{request_id}_mask.png"))
    }

    pub fn work_path(&self, request_id: &Uuid, label: &str) -> PathBuf {
        self.work_dir().join(format!("{request_id}_{label}.png"))
    }

    pub fn output_file_name(request_id: &Uuid) -> String {
        format!("{request_id}_output.png")
    }

    pub fn output_path(&self, request_id: &Uuid) -> PathBuf {
        self.outputs_dir().join(Self::output_file_name(request_id))
    }

    /// Encode `img` as PNG and write it to `path`.
    pub async fn save_png(&self, img: &DynamicImage, path: &Path) -> std::io::Result<()> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, buf).await
    }

    /// Remove an upload that will not be processed.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove upload");
        }
    }

    /// Remove intermediate files of a finished request. Missing files are fine.
    pub async fn remove_work_files(&self, request_id: &Uuid, labels: &[&str]) {
        for label in labels {
            let path = self.work_path(request_id, label);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "failed to remove work file");
                }
            }
        }
    }
}

/// Public URL of a file in the outputs directory.
pub fn output_url(api_base_url: &str, file_name: &str) -> String {
    format!("{}/data/outputs/{file_name}", api_base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_request_id() {
        let store = ImageStore::new("/srv/data");
        let id = Uuid::nil();
        assert_eq!(
            store.output_path(&id),
            PathBuf::from("/srv/data/outputs/00000000-0000-0000-0000-000000000000_output.png")
        );
        assert!(store.input_path(&id).ends_with("inputs/00000000-0000-0000-0000-000000000000_input.png"));
        assert!(store.work_path(&id, "control").ends_with("work/00000000-0000-0000-0000-000000000000_control.png"));
    }

    #[test]
    fn output_url_joins_base() {
        assert_eq!(
            output_url("http://localhost:8000/", "x_output.png"),
            "http://localhost:8000/data/outputs/x_output.png"
        );
    }

    #[tokio::test]
    async fn save_png_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_dirs().await.unwrap();
        let path = store.output_path(&Uuid::new_v4());
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        store.save_png(&img, &path).await.unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (4, 4));
    }

    #[tokio::test]
    async fn discard_removes_upload_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_dirs().await.unwrap();
        let path = store.input_path(&Uuid::new_v4());
        tokio::fs::write(&path, b"png").await.unwrap();

        store.discard(&path).await;
        assert!(!path.exists());
        store.discard(&path).await;
    }
}
