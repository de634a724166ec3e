use serde::{Deserialize, Serialize};

use crate::domain::detection::Detection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionDto {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl From<Detection> for DetectionDto {
    fn from(d: Detection) -> Self {
        Self { class_name: d.class_name, confidence: d.confidence, bbox: d.bbox.to_array() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub detections: Vec<DetectionDto>,
    pub image_url: String,
    pub detection_count: usize,
}

impl PredictResponse {
    /// `detection_count` se calcula siempre a partir de la lista.
    pub fn new(detections: Vec<Detection>, image_url: String) -> Self {
        let detections: Vec<DetectionDto> = detections.into_iter().map(Into::into).collect();
        Self { detection_count: detections.len(), detections, image_url }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "ok".into(), message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: "error".into(), message: Some(message.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
