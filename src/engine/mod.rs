//! Audio engine
//!
//! [`AudioEngine`] owns two slot-table registries — decoded sample sources
//! and playback voices — behind a single shared lock. Control-thread
//! operations (create, play, pause, stop, volume) hold the lock for their
//! full duration; the mixer pass acquires it exactly once per output buffer,
//! so the worst-case callback latency is bounded by live voice count times
//! buffer size. The engine is an explicitly constructed object: the output
//! device and any worker threads share it through a cloned handle, not
//! through process-global state.
//!
//! Playback-control operations on stale voice handles are deliberate no-ops.
//! A fire-and-forget voice may be garbage-collected by the mixer at any
//! moment, so by the time the caller issues a follow-up command the handle
//! may already be dead; that race is expected, not an error.

pub(crate) mod mixer;
mod source;
mod voice;

pub(crate) use source::Source;
pub use source::SourceInfo;
pub(crate) use voice::Voice;
pub use voice::VoiceSpec;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::decode::{self, DecodedClip};
use crate::slot::{Handle, SlotArray};
use crate::Result;

/// Handle to a decoded source in the engine's registry.
pub type SourceId = Handle;

/// Handle to a playback voice in the engine's registry.
pub type VoiceId = Handle;

/// Observer of finished mixer passes: `(buffer, channels, sample_rate, frames)`.
pub(crate) type CommitHook = Box<dyn FnMut(&[i16], u16, u32, usize) + Send>;

/// Engine-wide mixing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interleaved output channel count
    pub channels: u16,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Lower bound applied to voice volumes at mix time
    pub min_volume: f32,
    /// Upper bound applied to voice volumes at mix time
    pub max_volume: f32,
}

impl EngineConfig {
    /// Stereo output at the given sample rate with the `[0.0, 1.0]` volume
    /// range.
    pub fn stereo(sample_rate: u32) -> Self {
        EngineConfig {
            channels: 2,
            sample_rate,
            min_volume: 0.0,
            max_volume: 1.0,
        }
    }

    /// Mono output at the given sample rate.
    pub fn mono(sample_rate: u32) -> Self {
        EngineConfig {
            channels: 1,
            ..Self::stereo(sample_rate)
        }
    }
}

impl Default for EngineConfig {
    /// Stereo at 44.1 kHz.
    fn default() -> Self {
        Self::stereo(44_100)
    }
}

/// Counters accumulated across mixer passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    /// Mixer passes run
    pub passes: u64,
    /// Output frames mixed across all passes
    pub frames_mixed: u64,
    /// Voices garbage-collected by the mixer
    pub voices_reaped: u64,
}

/// Everything behind the shared lock.
pub(crate) struct EngineState {
    pub sources: SlotArray<Source>,
    pub voices: SlotArray<Voice>,
    pub min_volume: f32,
    pub max_volume: f32,
    pub commit: Option<CommitHook>,
    /// Deferred voice removals, reused across passes so steady-state mixing
    /// does not allocate
    pub reap: Vec<Handle>,
    pub stats: MixerStats,
}

/// Handle-based real-time audio mixing engine.
///
/// Cheap to clone; clones share the same registries and lock. See the
/// [module docs](self) for the locking contract.
#[derive(Clone)]
pub struct AudioEngine {
    state: Arc<Mutex<EngineState>>,
    config: EngineConfig,
}

impl AudioEngine {
    /// Create an engine with the given output layout and volume bounds.
    pub fn new(config: EngineConfig) -> Self {
        log::debug!(
            "audio engine: {} ch @ {} Hz, volume [{}, {}]",
            config.channels,
            config.sample_rate,
            config.min_volume,
            config.max_volume
        );
        AudioEngine {
            state: Arc::new(Mutex::new(EngineState {
                sources: SlotArray::new(),
                voices: SlotArray::with_capacity(32),
                min_volume: config.min_volume,
                max_volume: config.max_volume,
                commit: None,
                reap: Vec::with_capacity(32),
                stats: MixerStats::default(),
            })),
            config,
        }
    }

    /// The output layout the engine mixes with in [`mix`](Self::mix).
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /* ------------------------------ Sources ------------------------------ */

    /// Decode an audio file and register it as a source.
    ///
    /// Decoding happens before the lock is taken — it is unbounded work, and
    /// the mixer shares this lock under a real-time deadline. On decode
    /// failure nothing is inserted.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<SourceId> {
        let path = path.as_ref();
        let clip = decode::decode(path)?;
        log::debug!(
            "loaded '{}': {} ch @ {} Hz, {} frames",
            path.display(),
            clip.channels,
            clip.sample_rate,
            clip.frame_count()
        );
        Ok(self.state.lock().sources.insert(Source::from(clip)))
    }

    /// Register an already-decoded clip as a source, taking ownership of its
    /// sample buffer.
    pub fn add_clip(&self, clip: DecodedClip) -> SourceId {
        self.state.lock().sources.insert(Source::from(clip))
    }

    /// Erase a source and free its samples.
    ///
    /// The caller must ensure no live voice still references the source; the
    /// mixer tolerates stale references (it skips and collects such voices),
    /// but their playback cuts off. Erasing an unknown handle is an error.
    pub fn destroy_source(&self, source: SourceId) -> Result<()> {
        self.state.lock().sources.erase(source).map(|_| ())
    }

    /// True if `source` is still registered.
    pub fn source_exists(&self, source: SourceId) -> bool {
        self.state.lock().sources.exists(source)
    }

    /// Layout and length of a registered source.
    pub fn source_info(&self, source: SourceId) -> Option<SourceInfo> {
        self.state.lock().sources.get(source).map(SourceInfo::from)
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /* ------------------------------ Voices ------------------------------- */

    /// Create a voice from `spec`.
    ///
    /// A non-finite or non-positive pitch falls back to 1.0. The source
    /// handle is not validated here: a voice whose source is missing is
    /// silently skipped (and collected, unless persistent) by the mixer.
    pub fn create_voice(&self, spec: VoiceSpec) -> VoiceId {
        let mut spec = spec;
        if !(spec.pitch.is_finite() && spec.pitch > 0.0) {
            spec.pitch = 1.0;
        }
        self.state.lock().voices.insert(Voice::from(spec))
    }

    /// Erase a voice. Erasing an unknown or already-collected handle is an
    /// error; use the playback-control operations for fire-and-forget voices
    /// instead of erasing them manually.
    pub fn destroy_voice(&self, voice: VoiceId) -> Result<()> {
        self.state.lock().voices.erase(voice).map(|_| ())
    }

    /// Fire-and-forget playback: create a one-shot, non-persistent voice on
    /// `source` at native pitch and start it immediately.
    pub fn play_source(&self, source: SourceId, volume: f32) -> VoiceId {
        let mut spec = VoiceSpec::new(source);
        spec.volume = volume;
        spec.playing = true;
        self.create_voice(spec)
    }

    /// True if `voice` is still registered.
    pub fn voice_exists(&self, voice: VoiceId) -> bool {
        self.state.lock().voices.exists(voice)
    }

    /// Number of live voices.
    pub fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Start or resume playback. No-op on a stale handle.
    pub fn play(&self, voice: VoiceId) {
        if let Some(v) = self.state.lock().voices.get_mut(voice) {
            v.playing = true;
        }
    }

    /// Halt playback, keeping the read position. No-op on a stale handle.
    ///
    /// Note that the mixer collects paused voices unless they are
    /// persistent, so pausing is only meaningful for persistent voices.
    pub fn pause(&self, voice: VoiceId) {
        if let Some(v) = self.state.lock().voices.get_mut(voice) {
            v.playing = false;
        }
    }

    /// Halt playback and rewind to the clip start. No-op on a stale handle.
    pub fn stop(&self, voice: VoiceId) {
        if let Some(v) = self.state.lock().voices.get_mut(voice) {
            v.playing = false;
            v.position = 0.0;
        }
    }

    /// Rewind to the clip start without changing the playing flag. No-op on
    /// a stale handle.
    pub fn restart(&self, voice: VoiceId) {
        if let Some(v) = self.state.lock().voices.get_mut(voice) {
            v.position = 0.0;
        }
    }

    /// True if the voice exists and is currently playing.
    pub fn is_playing(&self, voice: VoiceId) -> bool {
        self.state
            .lock()
            .voices
            .get(voice)
            .map_or(false, |v| v.playing)
    }

    /// Set a voice's volume. The raw value is stored; clamping to the
    /// engine-wide bounds happens at mix time, so later bound changes apply
    /// retroactively. No-op on a stale handle.
    pub fn set_volume(&self, voice: VoiceId, volume: f32) {
        if let Some(v) = self.state.lock().voices.get_mut(voice) {
            v.volume = volume;
        }
    }

    /// A voice's stored (unclamped) volume, or 0.0 for a stale handle.
    pub fn get_volume(&self, voice: VoiceId) -> f32 {
        self.state
            .lock()
            .voices
            .get(voice)
            .map_or(0.0, |v| v.volume)
    }

    /// Reconfigure the engine-wide volume clamp range. Applies to every
    /// voice on the next mixer pass.
    pub fn set_volume_bounds(&self, min: f32, max: f32) {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let mut state = self.state.lock();
        state.min_volume = lo;
        state.max_volume = hi;
    }

    /* ------------------------------ Mixing ------------------------------- */

    /// Run one mixer pass into `out` using the engine's configured layout.
    ///
    /// This is the offline-rendering and test entry point; the output device
    /// drives the same pass from the audio callback with the device layout.
    pub fn mix(&self, out: &mut [i16]) {
        let mut state = self.state.lock();
        mixer::mix_pass(
            &mut state,
            out,
            self.config.channels,
            self.config.sample_rate,
        );
    }

    /// Register the commit hook, replacing any previous one. The hook runs
    /// once per mixer pass with the finished buffer.
    pub fn set_commit_hook(&self, hook: impl FnMut(&[i16], u16, u32, usize) + Send + 'static) {
        self.state.lock().commit = Some(Box::new(hook));
    }

    /// Remove the commit hook.
    pub fn clear_commit_hook(&self) {
        self.state.lock().commit = None;
    }

    /// Counters accumulated since engine creation.
    pub fn stats(&self) -> MixerStats {
        self.state.lock().stats
    }

    #[cfg(feature = "playback")]
    pub(crate) fn shared_state(&self) -> Arc<Mutex<EngineState>> {
        Arc::clone(&self.state)
    }
}
