//! Post-processing for accepted visuals.
//!
//! Applied to frames the gate has already scored. Steps, in order: a mild
//! global contrast lift, an unsharp mask, a saturation boost and a grade.

use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use super::QualityError;

/// Gaussian sigma of the unsharp mask.
const BLUR_SIGMA: f32 = 2.0;

/// Contrast lift in percent, as taken by `imageops::contrast`.
const CONTRAST_PERCENT: f32 = 8.0;

/// Chroma gain around each pixel's luma.
const SATURATION: f32 = 1.25;

/// How much high-pass detail the unsharp mask adds back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharpenStrength {
    Low,
    #[default]
    Medium,
    High,
}

impl SharpenStrength {
    pub fn amount(self) -> f32 {
        match self {
            SharpenStrength::Low => 1.2,
            SharpenStrength::Medium => 1.5,
            SharpenStrength::High => 2.0,
        }
    }
}

/// Colour grade applied last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageLook {
    Neutral,
    /// Slight gamma lift, cool shadows, warm highlights.
    #[default]
    Cinematic,
    /// Red and green up, blue down.
    Warm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Enhancer {
    pub sharpen: SharpenStrength,
    pub look: ImageLook,
}

impl Enhancer {
    pub fn new(sharpen: SharpenStrength, look: ImageLook) -> Self {
        Self { sharpen, look }
    }

    pub fn enhance(&self, image: &DynamicImage) -> RgbImage {
        let lifted = imageops::contrast(&image.to_rgb8(), CONTRAST_PERCENT);
        let mut out = sharpen(&lifted, self.sharpen.amount());
        saturate(&mut out, SATURATION);
        match self.look {
            ImageLook::Neutral => {}
            ImageLook::Cinematic => grade_cinematic(&mut out),
            ImageLook::Warm => grade_warm(&mut out),
        }
        out
    }

    /// Decode `input`, enhance it and write it to `output` in the format
    /// its extension names. `input` and `output` may be the same file.
    pub fn enhance_file(&self, input: &Path, output: &Path) -> Result<(), QualityError> {
        let image = image::open(input).map_err(|source| QualityError::Decode {
            path: input.to_path_buf(),
            source,
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(QualityError::Empty(input.to_path_buf()));
        }

        let format = ImageFormat::from_path(output).unwrap_or(ImageFormat::Png);
        self.enhance(&image)
            .save_with_format(output, format)
            .map_err(|source| QualityError::Encode {
                path: output.to_path_buf(),
                source,
            })
    }

    /// Enhance a file on the blocking pool.
    pub async fn enhance_file_async(&self, input: PathBuf, output: PathBuf) -> Result<(), QualityError> {
        let enhancer = *self;
        tokio::task::spawn_blocking(move || enhancer.enhance_file(&input, &output))
            .await
            .map_err(|e| QualityError::Join(e.to_string()))?
    }
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn luma(px: [u8; 3]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

/// `pixel + amount * (pixel - blurred)`, per channel.
fn sharpen(rgb: &RgbImage, amount: f32) -> RgbImage {
    let blurred = imageops::blur(rgb, BLUR_SIGMA);
    let mut out = rgb.clone();
    for (px, soft) in out.pixels_mut().zip(blurred.pixels()) {
        for (c, s) in px.0.iter_mut().zip(soft.0) {
            let v = *c as f32;
            *c = to_channel(v + amount * (v - s as f32));
        }
    }
    out
}

fn saturate(rgb: &mut RgbImage, gain: f32) {
    for px in rgb.pixels_mut() {
        let y = luma(px.0);
        for c in px.0.iter_mut() {
            *c = to_channel(y + (*c as f32 - y) * gain);
        }
    }
}

fn grade_cinematic(rgb: &mut RgbImage) {
    for px in rgb.pixels_mut() {
        let y = luma(px.0);
        let mut v = px.0.map(|c| (c as f32 / 255.0).powf(0.95) * 255.0);
        if y < 85.0 {
            v[2] += 5.0;
        } else if y > 170.0 {
            v[0] += 3.0;
            v[1] += 2.0;
        }
        px.0 = v.map(to_channel);
    }
}

fn grade_warm(rgb: &mut RgbImage) {
    for px in rgb.pixels_mut() {
        let [r, g, b] = px.0;
        px.0 = [
            to_channel(r as f32 * 1.05),
            to_channel(g as f32 * 1.03),
            to_channel(b as f32 * 0.97),
        ];
    }
}
