use serde::{Deserialize, Serialize};

use super::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,      // logical name, e.g. "yolov8_crop_weed"
    pub onnx_path: String, // filesystem path
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloParams {
    pub input_size: u32,       // 640 typical
    pub conf_threshold: f32,   // 0..1
    pub iou_threshold: f32,    // 0..1
    pub max_detections: usize, // e.g. 300
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Tabla ordenada de etiquetas: la posición es el índice de clase del modelo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Un índice fuera de la tabla es un error de configuración, no algo
    /// que se pueda saltar por detección.
    pub fn resolve(&self, index: usize) -> DomainResult<&str> {
        self.0
            .get(index)
            .map(String::as_str)
            .ok_or(DomainError::UnknownClass { index, len: self.0.len() })
    }
}
