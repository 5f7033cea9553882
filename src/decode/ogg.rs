//! Ogg Vorbis decoding via lewton

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lewton::inside_ogg::OggStreamReader;

use super::{decode_error, DecodedClip};
use crate::Result;

pub fn decode(path: &Path) -> Result<DecodedClip> {
    let file = File::open(path)?;
    let mut reader =
        OggStreamReader::new(BufReader::new(file)).map_err(|e| decode_error(path, e))?;
    let channels = reader.ident_hdr.audio_channels as u16;
    let sample_rate = reader.ident_hdr.audio_sample_rate;

    let mut samples = Vec::new();
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| decode_error(path, e))?
    {
        samples.extend_from_slice(&packet);
    }

    Ok(DecodedClip::new(samples, channels, sample_rate))
}
