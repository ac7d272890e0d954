//! Minimal 16-bit PCM WAV reading and writing.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Write little-endian 16-bit mono PCM bytes as a WAV file.
pub fn write_pcm16_mono(path: &Path, pcm: &[u8], sample_rate: u32) -> io::Result<()> {
    let data_len = u32::try_from(pcm.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PCM payload too large"))?;
    let channels: u16 = 1;
    let bits: u16 = 16;
    let block_align = channels * bits / 8;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut file = io::BufWriter::new(fs::File::create(path)?);
    file.write_all(b"RIFF")?;
    file.write_all(&(36 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?;
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits.to_le_bytes())?;
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    file.write_all(pcm)?;
    file.flush()
}

/// Write `secs` of silence.
pub fn write_silence(path: &Path, secs: f64, sample_rate: u32) -> io::Result<()> {
    let samples = (secs.max(0.0) * f64::from(sample_rate)).round() as usize;
    write_pcm16_mono(path, &vec![0u8; samples * 2], sample_rate)
}

/// Duration of 16-bit mono PCM at `sample_rate`.
pub fn pcm16_duration(bytes: usize, sample_rate: u32) -> f64 {
    bytes as f64 / (2.0 * f64::from(sample_rate))
}

/// Read a WAV header and compute its duration from the data chunk.
pub fn read_duration(path: &Path) -> io::Result<f64> {
    let bytes = fs::read(path)?;
    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(invalid("not a RIFF/WAVE file"));
    }

    let mut byte_rate: Option<u32> = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body = offset + 8;

        if id == b"fmt " && body + 12 <= bytes.len() {
            byte_rate = Some(u32::from_le_bytes([
                bytes[body + 8],
                bytes[body + 9],
                bytes[body + 10],
                bytes[body + 11],
            ]));
        } else if id == b"data" {
            let rate = byte_rate.filter(|r| *r > 0).ok_or_else(|| invalid("data before fmt"))?;
            // Streams written before their length was known carry a bogus size
            let available = bytes.len().saturating_sub(body);
            return Ok(size.min(available) as f64 / f64::from(rate));
        }

        // Chunks are word aligned
        offset = body + size + (size & 1);
    }

    Err(invalid("no data chunk"))
}
