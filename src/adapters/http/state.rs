use std::sync::Arc;
use crate::application::services::DetectionService;

/// Estado compartido para los manejadores HTTP de Axum.
#[derive(Clone)]
pub struct HttpState {
    /// Inferencia, imágenes anotadas y salud del modelo.
    pub detection: Arc<DetectionService>,
}
