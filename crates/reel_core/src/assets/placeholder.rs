//! Synthesized stand-ins: solid frames and silent audio.

use std::io;
use std::path::Path;

use image::{Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::wav;

pub const FRAME_WIDTH: u32 = 1080;
pub const FRAME_HEIGHT: u32 = 1920;

/// Colour derived from a label, kept mid-range so frames are never pure black or white.
pub fn label_color(label: &str) -> [u8; 3] {
    let digest = Sha256::digest(label.as_bytes());
    [
        48 + digest[0] % 160,
        48 + digest[1] % 160,
        48 + digest[2] % 160,
    ]
}

/// Write a solid 1080x1920 PNG keyed by `label`, with a darker band across
/// the lower third so consecutive placeholders are distinguishable.
pub fn write_image(path: &Path, label: &str) -> io::Result<()> {
    let [r, g, b] = label_color(label);
    let band = Rgb([r / 2, g / 2, b / 2]);
    let fill = Rgb([r, g, b]);
    let band_rows = (FRAME_HEIGHT * 2 / 3)..(FRAME_HEIGHT * 2 / 3 + FRAME_HEIGHT / 12);

    let image = RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |_, y| {
        if band_rows.contains(&y) {
            band
        } else {
            fill
        }
    });
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(io::Error::other)
}

/// Write `secs` of silent 16-bit mono audio.
pub fn write_silence(path: &Path, secs: f64) -> io::Result<()> {
    wav::write_silence(path, secs, wav::DEFAULT_SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn colour_is_stable_per_label() {
        assert_eq!(label_color("scene-1"), label_color("scene-1"));
        assert_ne!(label_color("scene-1"), label_color("scene-2"));
    }

    #[test]
    fn placeholder_image_has_frame_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.png");
        write_image(&path, "broll-1-0").unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (FRAME_WIDTH, FRAME_HEIGHT));
    }
}
