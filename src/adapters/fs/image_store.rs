use image::{ImageFormat, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

use crate::application::ports::ImageStorePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Directorio plano de JPEGs. No hay política de limpieza: los ficheros se
/// acumulan.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageStorePort for FsImageStore {
    fn ensure(&self) -> DomainResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| DomainError::Persist {
            name: self.root.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn save_jpeg(&self, name: &str, image: &RgbImage) -> DomainResult<PathBuf> {
        let path = self.locate(name);
        image
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| DomainError::Persist { name: name.to_string(), reason: e.to_string() })?;
        Ok(path)
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}
