use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("No image uploaded")]
    MissingInput,
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("cannot persist {name}: {reason}")]
    Persist { name: String, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model returned no results")]
    EmptyOutput,
    #[error("cannot render detections: {0}")]
    Render(String),
    #[error(
        "inconsistent model output: {boxes} boxes, {classes} classes, {confidences} confidences"
    )]
    InconsistentOutput {
        boxes: usize,
        classes: usize,
        confidences: usize,
    },
    #[error("class index {index} outside label table of {len} entries")]
    UnknownClass { index: usize, len: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl DomainError {
    /// Fallos dentro del pipeline de una petición (decodificar, guardar,
    /// inferir, dibujar, serializar).
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            DomainError::Decode(_)
                | DomainError::Persist { .. }
                | DomainError::Inference(_)
                | DomainError::EmptyOutput
                | DomainError::Render(_)
                | DomainError::InconsistentOutput { .. }
                | DomainError::UnknownClass { .. }
                | DomainError::OperationFailed(_)
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
