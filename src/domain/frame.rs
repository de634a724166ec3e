use image::RgbImage;

use super::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Buffer empaquetado de 3 canales (8 bits) tal y como lo entrega el
/// renderizador del modelo.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height, order: ChannelOrder::Rgb, data: image.into_raw() }
    }

    /// Convierte al orden RGB que espera el almacén de salida.
    pub fn into_rgb_image(self) -> DomainResult<RgbImage> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(DomainError::Render(format!(
                "buffer of {} bytes does not match {}x{}x3",
                self.data.len(),
                self.width,
                self.height
            )));
        }

        let mut data = self.data;
        if self.order == ChannelOrder::Bgr {
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| DomainError::Render("cannot build RGB image".into()))
    }
}
