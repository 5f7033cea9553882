//! WAV decoding via hound
//!
//! Integer sources are widened or narrowed to 16 bits; float sources are
//! scaled and clamped.

use std::path::Path;

use hound::{SampleFormat, WavReader};

use super::{decode_error, DecodedClip};
use crate::{Error, Result};

pub fn decode(path: &Path) -> Result<DecodedClip> {
    let mut reader = WavReader::open(path).map_err(|e| map_err(path, e))?;
    let spec = reader.spec();

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, bits) if bits <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v << (16 - bits)))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| map_err(path, e))?,
        (SampleFormat::Int, bits) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| (v >> (bits - 16)) as i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| map_err(path, e))?,
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| map_err(path, e))?,
    };

    Ok(DecodedClip::new(samples, spec.channels, spec.sample_rate))
}

fn map_err(path: &Path, err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(e) => Error::Io(e),
        other => decode_error(path, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn pcm16_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let samples = [100i16, -100, 2000, -2000, 30_000, -30_000];
        write_wav(&path, spec, &samples);

        let clip = decode(&path).unwrap();
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.sample_rate, 44_100);
        assert_eq!(clip.frame_count(), 3);
        assert_eq!(clip.samples, samples);
    }

    #[test]
    fn truncated_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFFnope").unwrap();

        let err = decode(&path).unwrap_err();
        assert!(matches!(err, Error::Decode { .. } | Error::Io(_)));
    }
}
