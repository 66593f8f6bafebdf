//! CLIP image preprocessing.
//!
//! Resize the shorter side to 224 (bicubic), center-crop 224x224, scale
//! to [0, 1] and normalize per channel with the CLIP training statistics.

use crate::scorer::ImageTensor;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use thiserror::Error;

// --- Named constants (CLIP ViT-B/32) ---
pub const CLIP_INPUT_SIZE: u32 = 224;
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Decode any format supported by the `image` crate into 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
    let img = image::load_from_memory(bytes)?.to_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(PreprocessError::Empty {
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(img)
}

/// Convert an RGB image into a normalized `[1, 3, 224, 224]` tensor.
pub fn preprocess(img: &RgbImage) -> Result<ImageTensor, PreprocessError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::Empty { width, height });
    }

    let (new_w, new_h) = resize_dims(width, height, CLIP_INPUT_SIZE);
    let resized = imageops::resize(img, new_w, new_h, FilterType::CatmullRom);

    let (crop_x, crop_y) = crop_origin(new_w, new_h, CLIP_INPUT_SIZE);
    let cropped = imageops::crop_imm(&resized, crop_x, crop_y, CLIP_INPUT_SIZE, CLIP_INPUT_SIZE).to_image();

    let size = CLIP_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - CLIP_MEAN[c]) / CLIP_STD[c];
        }
    }

    Ok(ImageTensor(tensor))
}

/// Scale so the shorter side equals `target`, keeping aspect ratio.
fn resize_dims(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let h = (target as u64 * height as u64 / width as u64) as u32;
        (target, h.max(target))
    } else {
        let w = (target as u64 * width as u64 / height as u64) as u32;
        (w.max(target), target)
    }
}

/// Top-left corner of a centered `target`-sized crop.
fn crop_origin(width: u32, height: u32, target: u32) -> (u32, u32) {
    let x = ((width - target) as f32 / 2.0).round() as u32;
    let y = ((height - target) as f32 / 2.0).round() as u32;
    (x, y)
}
