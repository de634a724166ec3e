use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::adapters::onnx::draw::LabelPainter;
use crate::adapters::onnx::yolo_engine::OnnxYoloEngine;
use crate::application::ports::{DetectorPort, ModelCatalogPort};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::{ClassLabels, ModelId, YoloParams};

/// Modelos ONNX en el sistema de ficheros. `font_path` sustituye la fuente
/// embebida de las etiquetas.
#[derive(Debug, Clone, Default)]
pub struct OnnxModelCatalog {
    font_path: Option<PathBuf>,
}

impl OnnxModelCatalog {
    pub fn new(font_path: Option<PathBuf>) -> Self {
        Self { font_path }
    }

    fn painter(&self) -> DomainResult<LabelPainter> {
        if let Some(path) = &self.font_path {
            match LabelPainter::from_file(path) {
                Ok(painter) => return Ok(painter),
                Err(e) => warn!("Fuente {} inutilizable ({:#}), se usa la embebida", path.display(), e),
            }
        }
        LabelPainter::embedded().map_err(|e| DomainError::OperationFailed(format!("{e:#}")))
    }
}

#[async_trait]
impl ModelCatalogPort for OnnxModelCatalog {
    async fn validate_model(&self, model: &ModelId) -> DomainResult<()> {
        let path = model.onnx_path.trim();
        if path.is_empty() {
            return Err(DomainError::InvalidInput("model path is empty".into()));
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(DomainError::InvalidInput(format!("{path} is not a file"))),
            Err(_) => return Err(DomainError::NotFound(format!("model file not found: {path}"))),
        }

        if Path::new(path).extension().and_then(|e| e.to_str()) != Some("onnx") {
            warn!("{} no tiene extensión .onnx, se intenta cargar igualmente", path);
        }
        Ok(())
    }

    fn load_model(
        &self,
        model: &ModelId,
        params: &YoloParams,
        labels: &ClassLabels,
    ) -> DomainResult<Arc<dyn DetectorPort>> {
        let painter = Arc::new(self.painter()?);
        let engine = OnnxYoloEngine::load(model.onnx_path.trim(), params.clone(), labels.clone(), painter)
            .map_err(|e| DomainError::OperationFailed(format!("cannot load {}: {e:#}", model.onnx_path)))?;
        Ok(Arc::new(engine))
    }
}
