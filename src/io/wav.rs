//! WAV output — 16-bit PCM masters and stems, with an optional RIFF
//! `LIST`/`INFO` comment chunk carrying the render hash.
//!
//! File handles are scoped: the encoder finishes into memory and the file
//! write is a single call, so handles are released on every path.

use std::io::Cursor;
use std::path::Path;

use crate::error::Result;

fn wav_spec(channels: u16, sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn encode(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(channels, sample_rate))?;
        for &s in samples {
            let clamped = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer.write_sample(clamped)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Append a `LIST`/`INFO` chunk with an `ICMT` comment and patch the RIFF
/// length to cover it.
fn append_comment_chunk(mut wav: Vec<u8>, comment: &str) -> Vec<u8> {
    let mut data = comment.as_bytes().to_vec();
    data.push(0); // null terminator
    if data.len() % 2 == 1 {
        data.push(0); // chunks are word-aligned
    }

    let icmt_size = data.len() as u32;
    let list_size = 4 + 8 + icmt_size; // "INFO" + ICMT header + payload

    wav.extend_from_slice(b"LIST");
    wav.extend_from_slice(&list_size.to_le_bytes());
    wav.extend_from_slice(b"INFO");
    wav.extend_from_slice(b"ICMT");
    wav.extend_from_slice(&icmt_size.to_le_bytes());
    wav.extend_from_slice(&data);

    let riff_size = (wav.len() - 8) as u32;
    wav[4..8].copy_from_slice(&riff_size.to_le_bytes());
    wav
}

/// Write an interleaved stereo master, embedding the render hash as an
/// `ICMT` comment when given.
pub fn write_master(
    path: &Path,
    stereo: &[f32],
    sample_rate: u32,
    render_hash: Option<&str>,
) -> Result<()> {
    let mut bytes = encode(stereo, 2, sample_rate)?;
    if let Some(hash) = render_hash {
        bytes = append_comment_chunk(bytes, hash);
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Write a mono stem.
pub fn write_stem(path: &Path, mono: &[f32], sample_rate: u32) -> Result<()> {
    let bytes = encode(mono, 1, sample_rate)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
