use clap::Parser;
use std::path::PathBuf;

use crate::domain::model::{ClassLabels, ModelId, YoloParams};

#[derive(Debug, Clone, Parser)]
#[command(name = "yolo-detect-server", version, about = "YOLO detection over HTTP")]
pub struct AppConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Fichero ONNX exportado del modelo YOLO
    #[arg(long, env = "MODEL_PATH", default_value = "yolov8_crop_weed.onnx")]
    pub model_path: String,

    /// Etiquetas en el orden de los índices de clase del modelo
    #[arg(long, env = "CLASS_NAMES", value_delimiter = ',', default_value = "crop,weed")]
    pub class_names: Vec<String>,

    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    #[arg(long, env = "OUTPUT_DIR", default_value = "static")]
    pub output_dir: PathBuf,

    #[arg(long, env = "YOLO_INPUT_SIZE", default_value_t = 640)]
    pub input_size: u32,

    #[arg(long, env = "YOLO_CONF_THRESHOLD", default_value_t = 0.25)]
    pub conf_threshold: f32,

    #[arg(long, env = "YOLO_IOU_THRESHOLD", default_value_t = 0.7)]
    pub iou_threshold: f32,

    #[arg(long, env = "YOLO_MAX_DETECTIONS", default_value_t = 300)]
    pub max_detections: usize,

    /// Fuente TTF/OTF para las etiquetas; sin valor se usa DejaVu Sans embebida
    #[arg(long, env = "LABEL_FONT_PATH")]
    pub font_path: Option<PathBuf>,

    /// Límite del cuerpo de /predict en bytes; sin valor no hay límite
    #[arg(long, env = "MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn model_id(&self) -> ModelId {
        let name = std::path::Path::new(&self.model_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".into());
        ModelId { name, onnx_path: self.model_path.clone() }
    }

    pub fn yolo_params(&self) -> YoloParams {
        YoloParams {
            input_size: self.input_size,
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }

    pub fn class_labels(&self) -> ClassLabels {
        ClassLabels::new(self.class_names.iter().map(|s| s.trim().to_string()))
    }
}
