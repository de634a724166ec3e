use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{
    errors::DomainResult,
    frame::PixelBuffer,
    model::{ClassLabels, ModelId, YoloParams},
};

/// Resultado de una inferencia sobre una imagen. Las tres secuencias son
/// posicionales: el elemento `i` de cada una describe el mismo objeto.
pub trait DetectionOutput: Send {
    /// `[x1, y1, x2, y2]` en píxeles de la imagen de entrada.
    fn boxes(&self) -> Vec<[f32; 4]>;
    fn classes(&self) -> Vec<usize>;
    fn confidences(&self) -> Vec<f32>;
    /// Imagen original con las cajas dibujadas.
    fn render(&self) -> DomainResult<PixelBuffer>;
}

/// Llamada bloqueante al modelo sobre un fichero ya persistido.
pub trait DetectorPort: Send + Sync {
    fn predict(&self, image_path: &Path) -> DomainResult<Vec<Box<dyn DetectionOutput>>>;
}

#[async_trait]
pub trait ModelCatalogPort: Send + Sync {
    async fn validate_model(&self, model: &ModelId) -> DomainResult<()>;
    fn load_model(
        &self,
        model: &ModelId,
        params: &YoloParams,
        labels: &ClassLabels,
    ) -> DomainResult<Arc<dyn DetectorPort>>;
}

/// Almacén de imágenes de solo escritura incremental (subidas o salidas).
pub trait ImageStorePort: Send + Sync {
    /// Crea el almacén si no existe. Idempotente.
    fn ensure(&self) -> DomainResult<()>;
    fn save_jpeg(&self, name: &str, image: &RgbImage) -> DomainResult<PathBuf>;
    fn locate(&self, name: &str) -> PathBuf;
}

/// Modelo cargado una vez al arrancar. Solo lectura a partir de ahí.
#[derive(Clone)]
pub enum ModelHandle {
    Ready(Arc<dyn DetectorPort>),
    Unavailable { reason: String },
}

impl ModelHandle {
    /// Valida y carga el modelo. Un fallo no aborta el arranque: queda
    /// registrado y el servicio responde en modo degradado.
    pub async fn initialize(
        catalog: &dyn ModelCatalogPort,
        model: &ModelId,
        params: &YoloParams,
        labels: &ClassLabels,
    ) -> Self {
        let loaded = match catalog.validate_model(model).await {
            Ok(()) => catalog.load_model(model, params, labels),
            Err(e) => Err(e),
        };

        match loaded {
            Ok(detector) => {
                info!("✅ Modelo '{}' cargado desde {}", model.name, model.onnx_path);
                ModelHandle::Ready(detector)
            }
            Err(e) => {
                error!("❌ Error cargando el modelo '{}': {}", model.name, e);
                ModelHandle::Unavailable { reason: e.to_string() }
            }
        }
    }

    pub fn detector(&self) -> Option<&Arc<dyn DetectorPort>> {
        match self {
            ModelHandle::Ready(d) => Some(d),
            ModelHandle::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelHandle::Ready(_))
    }
}
