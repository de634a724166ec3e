use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use crate::adapters::onnx::yolo_engine::RawDetection;
use crate::domain::model::ClassLabels;

const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

static EMBEDDED_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

// Paleta por índice de clase
const PALETTE: [[u8; 3]; 8] = [
    [56, 56, 255],
    [151, 157, 255],
    [31, 112, 255],
    [29, 178, 255],
    [49, 210, 207],
    [10, 249, 72],
    [23, 204, 146],
    [134, 219, 61],
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Dibuja marcos y etiquetas `"{clase} {confianza}"`. La fuente se carga una
/// sola vez al cargar el motor.
pub struct LabelPainter {
    font: FontArc,
    scale: PxScale,
}

impl LabelPainter {
    pub fn embedded() -> Result<Self> {
        let font = FontArc::try_from_slice(EMBEDDED_FONT).context("embedded font is not a valid TTF")?;
        Ok(Self::with_font(font))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("{} is not a valid TTF/OTF font", path.display()))?;
        Ok(Self::with_font(font))
    }

    fn with_font(font: FontArc) -> Self {
        Self { font, scale: PxScale::from(LABEL_FONT_SIZE) }
    }

    pub fn label_text(labels: &ClassLabels, det: &RawDetection) -> String {
        match labels.resolve(det.class_id) {
            Ok(name) => format!("{} {:.2}", name, det.score),
            Err(_) => format!("class {} {:.2}", det.class_id, det.score),
        }
    }

    pub fn draw(&self, image: &mut RgbImage, detections: &[RawDetection], labels: &ClassLabels) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        if w == 0 || h == 0 {
            return;
        }

        for det in detections {
            let color = class_color(det.class_id);
            let x_min = (det.bbox.x1.floor() as i32).clamp(0, w - 1);
            let y_min = (det.bbox.y1.floor() as i32).clamp(0, h - 1);
            let x_max = (det.bbox.x2.ceil() as i32).clamp(0, w - 1);
            let y_max = (det.bbox.y2.ceil() as i32).clamp(0, h - 1);

            for t in 0..BOX_THICKNESS {
                let bw = x_max - x_min - 2 * t + 1;
                let bh = y_max - y_min - 2 * t + 1;
                if bw <= 0 || bh <= 0 {
                    break;
                }
                let rect = Rect::at(x_min + t, y_min + t).of_size(bw as u32, bh as u32);
                draw_hollow_rect_mut(image, rect, color);
            }

            self.draw_label(image, x_min, y_min, &Self::label_text(labels, det), color);
        }
    }

    /// Banda de etiqueta encima de la caja; si no cabe, dentro de ella.
    fn draw_label(&self, image: &mut RgbImage, x: i32, y_box: i32, text: &str, color: Rgb<u8>) {
        let (text_w, text_h) = text_size(self.scale, &self.font, text);
        let band_w = (text_w as i32 + 2 * LABEL_PADDING).min(image.width() as i32 - x);
        let band_h = text_h as i32 + 2 * LABEL_PADDING;
        if band_w <= 0 || band_h <= 0 {
            return;
        }

        let y = if y_box >= band_h { y_box - band_h } else { y_box };
        let band = Rect::at(x, y).of_size(band_w as u32, band_h as u32);
        draw_filled_rect_mut(image, band, color);
        draw_text_mut(
            image,
            LABEL_TEXT_COLOR,
            x + LABEL_PADDING,
            y + LABEL_PADDING,
            self.scale,
            &self.font,
            text,
        );
    }
}
