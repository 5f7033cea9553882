//! MP3 decoding via minimp3

use std::fs::File;
use std::path::Path;

use minimp3::{Decoder, Error as Mp3Error, Frame};

use super::{decode_error, DecodedClip};
use crate::Result;

pub fn decode(path: &Path) -> Result<DecodedClip> {
    let mut decoder = Decoder::new(File::open(path)?);
    let mut samples = Vec::new();
    let mut channels = 0u16;
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(Frame {
                data,
                sample_rate: rate,
                channels: ch,
                ..
            }) => {
                if channels == 0 {
                    channels = ch as u16;
                    sample_rate = rate as u32;
                } else if ch as u16 != channels || rate as u32 != sample_rate {
                    // A flat clip cannot represent mid-stream layout changes;
                    // keep the opening layout and drop the stray frames.
                    log::warn!(
                        "{}: ignoring mid-stream layout change ({} ch @ {} Hz)",
                        path.display(),
                        ch,
                        rate
                    );
                    continue;
                }
                samples.extend_from_slice(&data);
            }
            Err(Mp3Error::Eof) => break,
            Err(e) => return Err(decode_error(path, e)),
        }
    }

    if channels == 0 {
        return Err(decode_error(path, "no decodable frames"));
    }
    Ok(DecodedClip::new(samples, channels, sample_rate))
}
