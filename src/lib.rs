//! Handle-based real-time audio mixing engine
//!
//! `polymix` mixes decoded PCM clips ("sources") through lightweight playback
//! instances ("voices") on a real-time audio callback, while a control thread
//! creates, mutates and destroys those voices concurrently. Both registries
//! sit on a stable-handle slot table: handles stay valid across erasure of
//! other entries even though the backing storage is compacted on every
//! removal, so fire-and-forget sounds can be garbage-collected by the mixer
//! without invalidating anything the caller still holds.
//!
//! # Features
//! - Stable integer handles over dense, swap-and-pop-compacted storage
//! - Per-voice volume, pitch, loop and persistence, mutable during playback
//! - Linear interpolation and additive mixing with saturating PCM16 output
//! - Single shared lock, acquired once per mixer pass
//! - Ogg Vorbis / WAV / MP3 decoding behind per-format feature flags
//! - Optional cpal output device and a commit hook for recording or
//!   visualization of each finished buffer
//!
//! # Crate feature flags
//! - `ogg` (default): Ogg Vorbis decoding via `lewton`
//! - `wav` (default): WAV decoding via `hound`
//! - `mp3` (default): MP3 decoding via `minimp3`
//! - `playback` (opt-in): real-time output (enables the optional `cpal` dep)
//!
//! # Quick start
//! ## Offline mixing
//! ```
//! use polymix::{AudioEngine, DecodedClip, EngineConfig, VoiceSpec};
//!
//! let engine = AudioEngine::new(EngineConfig::default());
//! let clip = DecodedClip::new(vec![1000, -1000, 2000, -2000], 2, 44_100);
//! let source = engine.add_clip(clip);
//!
//! let mut spec = VoiceSpec::new(source);
//! spec.playing = true;
//! let voice = engine.create_voice(spec);
//!
//! let mut buffer = vec![0i16; 2 * 64];
//! engine.mix(&mut buffer);
//! assert!(!engine.is_playing(voice)); // one-shot clip finished in one pass
//! ```
//!
//! ## Real-time playback
//! ```no_run
//! # #[cfg(feature = "playback")]
//! # fn demo() -> polymix::Result<()> {
//! use polymix::{AudioEngine, EngineConfig, OutputDevice};
//!
//! let engine = AudioEngine::new(EngineConfig::default());
//! let _device = OutputDevice::open(&engine)?;
//! let source = engine.load("assets/jump.wav")?;
//! engine.play_source(source, 0.8);
//! # Ok(()) }
//! ```

#![warn(missing_docs)]

pub mod decode;
pub mod engine;
#[cfg(feature = "playback")]
pub mod output;
pub mod slot;

/// Error types for engine, decoder and output-device operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// File extension is not a supported decoder format (or its decoder
    /// feature is compiled out)
    #[error("unsupported audio format: '{0}'")]
    UnsupportedFormat(String),

    /// A decoder rejected the file contents
    #[error("failed to decode '{path}': {reason}")]
    Decode {
        /// Path of the file that failed to decode
        path: String,
        /// Decoder-reported reason
        reason: String,
    },

    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A handle was out of range or already erased
    #[error("invalid handle: {0}")]
    InvalidHandle(slot::Handle),

    /// No audio output device is available
    #[error("no audio output device found")]
    NoDevice,

    /// Failed to build the output stream
    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Failed to start the output stream
    #[error("failed to start audio stream: {0}")]
    StreamPlay(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

// Public API exports
pub use decode::{decode, DecodedClip};
pub use engine::{
    AudioEngine, EngineConfig, MixerStats, SourceId, SourceInfo, VoiceId, VoiceSpec,
};
#[cfg(feature = "playback")]
pub use output::OutputDevice;
pub use slot::{Handle, SlotArray, INVALID_HANDLE};
