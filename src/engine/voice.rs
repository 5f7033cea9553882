//! Playback voices

use super::SourceId;
use crate::slot::INVALID_HANDLE;

/// Initial state for a voice.
///
/// All fields are public; start from [`VoiceSpec::new`] and override what
/// the sound needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSpec {
    /// Source the voice reads from
    pub source: SourceId,
    /// Volume multiplier, clamped to the engine-wide bounds at mix time
    pub volume: f32,
    /// Playback-rate multiplier (1.0 = native rate); non-finite or
    /// non-positive values fall back to 1.0
    pub pitch: f32,
    /// Wrap to the clip start at end-of-clip instead of finishing
    pub looped: bool,
    /// Pause instead of destroy when playback finishes; the caller owns the
    /// voice's lifecycle
    pub persistent: bool,
    /// Start playing immediately
    pub playing: bool,
}

impl VoiceSpec {
    /// Spec with the defaults: full volume, native pitch, one-shot, not yet
    /// playing.
    pub fn new(source: SourceId) -> Self {
        VoiceSpec {
            source,
            volume: 1.0,
            pitch: 1.0,
            looped: false,
            persistent: false,
            playing: false,
        }
    }
}

impl Default for VoiceSpec {
    fn default() -> Self {
        Self::new(INVALID_HANDLE)
    }
}

/// Mutable playback state of one instance of a source.
#[derive(Debug, Clone)]
pub(crate) struct Voice {
    /// Weak reference: validated against the source registry every pass
    pub source: SourceId,
    pub volume: f32,
    pub pitch: f32,
    pub looped: bool,
    pub persistent: bool,
    pub playing: bool,
    /// Fractional read position in interleaved samples; fractional because
    /// pitch may be non-integer
    pub position: f64,
}

impl From<VoiceSpec> for Voice {
    fn from(spec: VoiceSpec) -> Self {
        Voice {
            source: spec.source,
            volume: spec.volume,
            pitch: spec.pitch,
            looped: spec.looped,
            persistent: spec.persistent,
            playing: spec.playing,
            position: 0.0,
        }
    }
}
