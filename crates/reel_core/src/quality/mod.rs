//! Quality gate for generated visuals.
//!
//! A weighted score in [0, 1]:
//!
//! | component  | weight | measure |
//! |------------|--------|---------|
//! | sharpness  | 0.4    | variance of the 4-neighbour Laplacian over luma |
//! | resolution | 0.2    | shortest edge |
//! | structure  | 0.2    | share of edge energy in the central region (portraits only) |
//! | exposure   | 0.2    | blown highlights / crushed shadows in the value channel |
//!
//! For non-portraits the structure weight moves to exposure. Scoring is a
//! pure function of the pixels.

mod enhance;

pub use enhance::{Enhancer, ImageLook, SharpenStrength};

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image {0} has no pixels")]
    Empty(PathBuf),

    #[error("Scoring task failed: {0}")]
    Join(String),
}

/// Component scores and the weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub sharpness: f64,
    pub resolution: f64,
    /// Only measured for portraits.
    pub structure: Option<f64>,
    pub exposure: f64,
    pub score: f64,
}

/// Accept/reject gate with a fixed threshold.
#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    threshold: f64,
}

impl QualityGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn accepts(&self, report: &QualityReport) -> bool {
        report.score >= self.threshold
    }

    /// Score decoded pixels.
    pub fn score_image(&self, image: &DynamicImage, portrait: bool) -> QualityReport {
        let luma = image.to_luma8();
        let (width, height) = image.dimensions();

        let laplacian = laplacian(&luma);
        let sharpness = sharpness_score(variance(&laplacian.values));
        let resolution = resolution_score(width.min(height));
        let exposure = exposure_score(image);

        let (structure, score) = if portrait {
            let structure = structure_score(&laplacian);
            (
                Some(structure),
                sharpness * 0.4 + resolution * 0.2 + structure * 0.2 + exposure * 0.2,
            )
        } else {
            (None, sharpness * 0.4 + resolution * 0.2 + exposure * 0.4)
        };

        QualityReport {
            sharpness,
            resolution,
            structure,
            exposure,
            score: score.clamp(0.0, 1.0),
        }
    }

    /// Decode and score a file.
    pub fn score_file(&self, path: &Path, portrait: bool) -> Result<QualityReport, QualityError> {
        let image = image::open(path).map_err(|source| QualityError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(QualityError::Empty(path.to_path_buf()));
        }
        Ok(self.score_image(&image, portrait))
    }

    /// Score a file on the blocking pool.
    pub async fn score_file_async(
        &self,
        path: PathBuf,
        portrait: bool,
    ) -> Result<QualityReport, QualityError> {
        let gate = *self;
        tokio::task::spawn_blocking(move || gate.score_file(&path, portrait))
            .await
            .map_err(|e| QualityError::Join(e.to_string()))?
    }
}

/// Laplacian response over the interior of a luma image.
struct LaplacianMap {
    width: usize,
    height: usize,
    /// Row-major interior values, (width-2) x (height-2).
    values: Vec<f64>,
}

fn laplacian(luma: &image::GrayImage) -> LaplacianMap {
    let (w, h) = (luma.width() as usize, luma.height() as usize);
    if w < 3 || h < 3 {
        return LaplacianMap {
            width: 0,
            height: 0,
            values: Vec::new(),
        };
    }

    let px = luma.as_raw();
    let at = |x: usize, y: usize| px[y * w + x] as f64;
    let mut values = Vec::with_capacity((w - 2) * (h - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            values.push(at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y));
        }
    }

    LaplacianMap {
        width: w - 2,
        height: h - 2,
        values,
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn sharpness_score(variance: f64) -> f64 {
    if variance > 300.0 {
        1.0
    } else if variance > 100.0 {
        0.5 + (variance - 100.0) / 400.0
    } else {
        variance / 200.0
    }
}

fn resolution_score(shortest_edge: u32) -> f64 {
    let edge = shortest_edge as f64;
    if edge >= 1920.0 {
        1.0
    } else if edge >= 1024.0 {
        0.5 + (edge - 1024.0) / 1792.0
    } else {
        edge / 2048.0
    }
}

/// Portrait framing: how much edge energy sits in the central region
/// (middle half of each axis). A well-framed subject keeps it between
/// 35% and 80%.
fn structure_score(map: &LaplacianMap) -> f64 {
    if map.values.is_empty() {
        return 0.5;
    }

    let (x0, x1) = (map.width / 4, map.width * 3 / 4);
    let (y0, y1) = (map.height / 4, map.height * 3 / 4);
    let mut total = 0.0;
    let mut central = 0.0;
    for (i, v) in map.values.iter().enumerate() {
        let energy = v.abs();
        total += energy;
        let (x, y) = (i % map.width, i / map.width);
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            central += energy;
        }
    }

    if total <= f64::EPSILON {
        return 0.5;
    }
    let share = central / total;
    if (0.35..=0.8).contains(&share) {
        1.0
    } else if (0.2..0.35).contains(&share) {
        0.7
    } else {
        0.3
    }
}

fn exposure_score(image: &DynamicImage) -> f64 {
    let rgb = image.to_rgb8();
    let n = (rgb.width() as u64 * rgb.height() as u64).max(1) as f64;
    let (mut over, mut under) = (0u64, 0u64);
    for pixel in rgb.pixels() {
        let value = pixel.0.iter().copied().max().unwrap_or(0);
        if value > 240 {
            over += 1;
        } else if value < 15 {
            under += 1;
        }
    }

    let over_ratio = over as f64 / n;
    let under_ratio = under as f64 / n;
    let over_score = if over_ratio > 0.1 {
        1.0 - (over_ratio * 5.0).min(1.0)
    } else {
        1.0
    };
    let under_score = if under_ratio > 0.2 {
        1.0 - ((under_ratio - 0.2) * 2.0).min(1.0)
    } else {
        1.0
    };
    (over_score + under_score) / 2.0
}
