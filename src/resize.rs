//! # Image Resize Module
//!
//! Ridimensionamento in memoria con il crate `image`, usato dalla pipeline
//! di conversione prima della ricodifica.
//!
//! ## Modalità
//! - **Fit**: scala mantenendo l'aspect ratio finché l'immagine sta nel box
//! - **Crop**: scala per coprire il box (aspect-fill), poi ritaglia al centro
//!   alle dimensioni esatte
//! - **None**: nessuna modifica
//!
//! Il filtro è sempre Lanczos3.

use crate::config::ResizeMode;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Resampling filter for every resize
const FILTER: FilterType = FilterType::Lanczos3;

/// Target box plus how it is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    pub mode: ResizeMode,
    pub width: u32,
    pub height: u32,
}

impl ResizeSpec {
    pub fn new(mode: ResizeMode, width: u32, height: u32) -> Self {
        Self { mode, width, height }
    }

    /// Final size of an image of `source` dimensions
    pub fn output_dimensions(&self, source: (u32, u32)) -> (u32, u32) {
        match self.mode {
            ResizeMode::None => source,
            ResizeMode::Fit => scaled(source, (self.width, self.height), false),
            ResizeMode::Crop => {
                let (w, h) = scaled(source, (self.width, self.height), true);
                (w.min(self.width), h.min(self.height))
            }
        }
    }

    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        match self.mode {
            ResizeMode::None => img,
            ResizeMode::Fit => img.resize(self.width, self.height, FILTER),
            ResizeMode::Crop => img.resize_to_fill(self.width, self.height, FILTER),
        }
    }
}

/// Scale `source` to fit inside (or, with `cover`, to cover) `target`, keeping the aspect ratio
fn scaled(source: (u32, u32), target: (u32, u32), cover: bool) -> (u32, u32) {
    let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let w_ratio = target.0 as f64 / sw;
    let h_ratio = target.1 as f64 / sh;
    let ratio = if cover { w_ratio.max(h_ratio) } else { w_ratio.min(h_ratio) };

    let w = ((sw * ratio).round() as u32).max(1);
    let h = ((sh * ratio).round() as u32).max(1);
    (w, h)
}

/// Dimensions of a decoded image, for log lines
pub fn dimensions(img: &DynamicImage) -> (u32, u32) {
    img.dimensions()
}
