use anyhow::{anyhow, bail, Context, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, Ix2, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Tensor;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::adapters::onnx::draw::LabelPainter;
use crate::application::ports::{DetectionOutput, DetectorPort};
use crate::domain::detection::BoundingBox;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::frame::PixelBuffer;
use crate::domain::model::{ClassLabels, YoloParams};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub score: f32,
}

pub struct OnnxYoloEngine {
    // ort exige `&mut Session` para `run`
    session: Mutex<Session>,
    params: YoloParams,
    labels: Arc<ClassLabels>,
    painter: Arc<LabelPainter>,
}

impl OnnxYoloEngine {
    pub fn load(
        path: &str,
        params: YoloParams,
        labels: ClassLabels,
        painter: Arc<LabelPainter>,
    ) -> Result<Self> {
        let model_bytes = fs::read(path).with_context(|| format!("reading {path}"))?;

        let builder = Session::builder()?.with_intra_threads(4)?;
        let builder = match builder.clone().with_execution_providers([CUDAExecutionProvider::default().build()]) {
            Ok(with_cuda) => with_cuda,
            Err(_) => {
                debug!("CUDA no disponible, el modelo corre en CPU");
                builder
            }
        };
        let session = builder.commit_from_memory(&model_bytes)?;

        Ok(Self { session: Mutex::new(session), params, labels: Arc::new(labels), painter })
    }

    pub fn infer(&self, rgb: &RgbImage) -> Result<Vec<RawDetection>> {
        if self.params.input_size == 0 {
            bail!("input_size must be positive");
        }
        let input = to_nchw(rgb, self.params.input_size);
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let (raw, _) = input.into_raw_vec_and_offset();
        let input_tensor = Tensor::from_array((shape, raw))?;

        let mut session = self.session.lock().map_err(|_| anyhow!("ONNX session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let (out_shape, out_data) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = out_shape.iter().map(|&x| x as usize).collect();
        let batch = ArrayViewD::from_shape(IxDyn(&dims), out_data)?;
        if batch.ndim() != 3 {
            bail!("unexpected YOLO output shape {:?}", dims);
        }
        let view = batch.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;

        let candidates = decode_predictions(view, &self.params, rgb.width(), rgb.height());
        let mut detections = non_max_suppression(candidates, self.params.iou_threshold);
        detections.truncate(self.params.max_detections);

        debug!("YOLO: {} detecciones tras NMS", detections.len());
        Ok(detections)
    }
}

/// Redimensiona a `size`² y pasa a tensor `[1, 3, size, size]` normalizado a `0..1`.
pub fn to_nchw(rgb: &RgbImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(rgb, size, size, FilterType::Triangle);
    let n = size as usize;
    Array4::from_shape_fn((1, 3, n, n), |(_, c, y, x)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// Decodifica la salida `[4 + nc, N]` de YOLOv8 (`cx, cy, w, h` y una
/// puntuación por clase) a cajas en píxeles de la imagen original. La salida
/// se ordena por confianza descendente.
pub fn decode_predictions(
    view: ArrayView2<'_, f32>,
    params: &YoloParams,
    src_width: u32,
    src_height: u32,
) -> Vec<RawDetection> {
    let imgsz = params.input_size as f32;
    if view.nrows() <= 4 || imgsz <= 0.0 {
        return Vec::new();
    }

    let num_candidates = view.ncols();
    let (w_img, h_img) = (src_width as f32, src_height as f32);
    let sx = w_img / imgsz;
    let sy = h_img / imgsz;

    let mut detections = Vec::new();

    for i in 0..num_candidates {
        let scores = view.slice(s![4.., i]);
        let Some((class_id, &max_score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(*b))
        else {
            continue;
        };

        if max_score > params.conf_threshold {
            let cx = view[[0, i]];
            let cy = view[[1, i]];
            let w = view[[2, i]];
            let h = view[[3, i]];

            let x1 = ((cx - w / 2.0) * sx).clamp(0.0, w_img);
            let y1 = ((cy - h / 2.0) * sy).clamp(0.0, h_img);
            let x2 = ((cx + w / 2.0) * sx).clamp(0.0, w_img);
            let y2 = ((cy + h / 2.0) * sy).clamp(0.0, h_img);

            detections.push(RawDetection {
                bbox: BoundingBox::from_corners((x1, y1), (x2, y2)),
                class_id,
                score: max_score.clamp(0.0, 1.0),
            });
        }
    }

    detections.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));
    detections
}

/// NMS por clase: solo se suprimen cajas de la misma clase.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

/// Resultado de una pasada del motor sobre una imagen.
pub struct YoloOutput {
    source: RgbImage,
    detections: Vec<RawDetection>,
    labels: Arc<ClassLabels>,
    painter: Arc<LabelPainter>,
}

impl YoloOutput {
    pub fn new(
        source: RgbImage,
        detections: Vec<RawDetection>,
        labels: Arc<ClassLabels>,
        painter: Arc<LabelPainter>,
    ) -> Self {
        Self { source, detections, labels, painter }
    }
}

impl DetectionOutput for YoloOutput {
    fn boxes(&self) -> Vec<[f32; 4]> {
        self.detections.iter().map(|d| d.bbox.to_array()).collect()
    }

    fn classes(&self) -> Vec<usize> {
        self.detections.iter().map(|d| d.class_id).collect()
    }

    fn confidences(&self) -> Vec<f32> {
        self.detections.iter().map(|d| d.score).collect()
    }

    fn render(&self) -> DomainResult<PixelBuffer> {
        let mut canvas = self.source.clone();
        self.painter.draw(&mut canvas, &self.detections, &self.labels);
        Ok(PixelBuffer::from_rgb(canvas))
    }
}

impl DetectorPort for OnnxYoloEngine {
    fn predict(&self, image_path: &Path) -> DomainResult<Vec<Box<dyn DetectionOutput>>> {
        let source = image::open(image_path)
            .map_err(|e| DomainError::Inference(format!("cannot open {}: {e}", image_path.display())))?
            .to_rgb8();
        let detections = self
            .infer(&source)
            .map_err(|e| DomainError::Inference(format!("{e:#}")))?;

        Ok(vec![Box::new(YoloOutput::new(
            source,
            detections,
            self.labels.clone(),
            self.painter.clone(),
        ))])
    }
}
