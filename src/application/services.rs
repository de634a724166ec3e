use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    application::ports::{DetectorPort, ImageStorePort, ModelHandle},
    domain::{
        detection::{BoundingBox, Detection},
        errors::{DomainError, DomainResult},
        model::ClassLabels,
    },
};

/// Prefijo de las imágenes anotadas dentro del almacén de salida.
pub const OUTPUT_PREFIX: &str = "detected_";

/// Lo que queda de una petición de inferencia una vez persistidas las imágenes.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub upload_filename: String,
    pub output_filename: String,
    pub detections: Vec<Detection>,
}

/// Nombre único para una subida: UUID v4 (122 bits aleatorios) en hexadecimal.
pub fn upload_filename() -> String {
    format!("{}.jpg", Uuid::new_v4().simple())
}

pub fn output_filename(upload_filename: &str) -> String {
    format!("{OUTPUT_PREFIX}{upload_filename}")
}

/// Orquesta una petición de detección de principio a fin y sirve las
/// imágenes anotadas.
#[derive(Clone)]
pub struct DetectionService {
    model: ModelHandle,
    labels: Arc<ClassLabels>,
    uploads: Arc<dyn ImageStorePort>,
    outputs: Arc<dyn ImageStorePort>,
}

impl DetectionService {
    pub fn new(
        model: ModelHandle,
        labels: ClassLabels,
        uploads: Arc<dyn ImageStorePort>,
        outputs: Arc<dyn ImageStorePort>,
    ) -> Self {
        Self { model, labels: Arc::new(labels), uploads, outputs }
    }

    pub fn health(&self) -> DomainResult<()> {
        self.ensure_ready().map(|_| ())
    }

    pub fn ensure_ready(&self) -> DomainResult<Arc<dyn DetectorPort>> {
        self.model.detector().cloned().ok_or(DomainError::ModelUnavailable)
    }

    /// Ejecuta el pipeline completo en el pool bloqueante de tokio: la
    /// inferencia es síncrona y no tiene timeout.
    pub async fn predict(&self, image_bytes: Vec<u8>) -> DomainResult<Prediction> {
        let detector = self.ensure_ready()?;
        let this = self.clone();

        tokio::task::spawn_blocking(move || this.run(detector.as_ref(), &image_bytes))
            .await
            .map_err(|e| DomainError::OperationFailed(format!("inference task aborted: {e}")))?
    }

    fn run(&self, detector: &dyn DetectorPort, image_bytes: &[u8]) -> DomainResult<Prediction> {
        // 1. Decodificar antes de tocar disco
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| DomainError::Decode(e.to_string()))?
            .to_rgb8();

        // 2. Persistir la subida
        let upload_filename = upload_filename();
        let upload_path = self.uploads.save_jpeg(&upload_filename, &image)?;
        debug!("Subida guardada en {}", upload_path.display());

        // 3. Inferencia sobre el fichero persistido
        let mut results = detector.predict(&upload_path)?;
        if results.is_empty() {
            return Err(DomainError::EmptyOutput);
        }
        let result = results.swap_remove(0);

        // 4. Imagen anotada
        let annotated = result.render()?.into_rgb_image()?;
        let output_filename = output_filename(&upload_filename);
        self.outputs.save_jpeg(&output_filename, &annotated)?;

        // 5. Detecciones
        let boxes = result.boxes();
        let classes = result.classes();
        let confidences = result.confidences();
        if boxes.len() != classes.len() || boxes.len() != confidences.len() {
            return Err(DomainError::InconsistentOutput {
                boxes: boxes.len(),
                classes: classes.len(),
                confidences: confidences.len(),
            });
        }

        let detections = boxes
            .into_iter()
            .zip(classes)
            .zip(confidences)
            .map(|((bbox, class_id), confidence)| {
                Ok(Detection {
                    class_name: self.labels.resolve(class_id)?.to_string(),
                    confidence,
                    bbox: BoundingBox::from_array(bbox),
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        info!("🔎 {} detecciones -> {}", detections.len(), output_filename);

        Ok(Prediction { upload_filename, output_filename, detections })
    }

    /// Lee una imagen del almacén de salida. El nombre se usa tal cual.
    pub async fn read_output(&self, filename: &str) -> DomainResult<Vec<u8>> {
        let path = self.outputs.locate(filename);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DomainError::NotFound(filename.to_string()),
            _ => {
                warn!("Error leyendo {}: {}", path.display(), e);
                DomainError::OperationFailed(e.to_string())
            }
        })
    }
}
