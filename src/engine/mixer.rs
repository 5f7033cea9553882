//! The mixer pass
//!
//! One pass covers one output buffer: walk every live voice, interpolate and
//! accumulate its samples, apply loop/stop transitions, then erase finished
//! non-persistent voices. Removal is deferred to the end of the walk so the
//! registry's swap-and-pop never disturbs a handle the walk has not visited
//! yet. The caller holds the engine lock for the whole pass.

use super::EngineState;
use crate::slot::Handle;

/// Mix one buffer of interleaved PCM16 output.
///
/// `out` is zeroed first; every playing voice then accumulates into it with
/// widened saturating arithmetic, so simultaneous voices mix additively.
/// Anything discovered mid-pass (stale source handle, finished clip,
/// zero-length clip) is handled by state transition, never by unwinding.
pub(crate) fn mix_pass(state: &mut EngineState, out: &mut [i16], channels: u16, sample_rate: u32) {
    out.fill(0);
    if channels == 0 {
        return;
    }
    let out_channels = channels as usize;
    let frames = out.len() / out_channels;

    for slot in 0..state.voices.slot_count() {
        let handle = slot as Handle;
        let Some(voice) = state.voices.get_mut(handle) else {
            continue;
        };

        let src = match state.sources.get(voice.source) {
            Some(src) if voice.playing => src,
            _ => {
                // Not playing, or the source has been erased out from under
                // the voice. Either way the voice contributes nothing.
                if !voice.persistent {
                    state.reap.push(handle);
                }
                continue;
            }
        };

        if src.samples.is_empty() || src.channels == 0 {
            voice.playing = false;
            voice.position = 0.0;
            if !voice.persistent {
                state.reap.push(handle);
            }
            continue;
        }

        let src_channels = src.channels as usize;
        let total = src.samples.len() as f64;
        let step = (src_channels as f64 * voice.pitch as f64).max(0.0);
        let volume = voice.volume.clamp(state.min_volume, state.max_volume);

        // A recycled source handle can leave a surviving voice positioned
        // beyond this clip's length; resolve that as end-of-clip before the
        // first read.
        if voice.position >= total {
            if voice.looped {
                voice.position %= total;
            } else {
                voice.playing = false;
                voice.position = 0.0;
                if !voice.persistent {
                    state.reap.push(handle);
                }
                continue;
            }
        }

        for frame in 0..frames {
            let group = (voice.position / src_channels as f64).floor();
            let frac = (voice.position / src_channels as f64 - group) as f32;
            // position < total, so the base group is always in bounds; the
            // second bracket sample clamps to the base at end-of-clip.
            let base = group as usize * src_channels;

            for ch in 0..out_channels {
                let read = base + ch.min(src_channels - 1);
                let s0 = src.samples[read] as f32;
                let s1 = match src.samples.get(read + src_channels) {
                    Some(&s) => s as f32,
                    None => s0,
                };
                let sample = (s0 + (s1 - s0) * frac) * volume;

                let at = frame * out_channels + ch;
                let acc = out[at] as i32 + sample as i32;
                out[at] = acc.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }

            voice.position += step;
            if voice.position >= total {
                if voice.looped {
                    // Phase-preserving wrap; modulo rather than subtraction
                    // so a step longer than the clip cannot leave the
                    // position past the end.
                    voice.position %= total;
                } else {
                    voice.playing = false;
                    voice.position = 0.0;
                    if !voice.persistent {
                        state.reap.push(handle);
                    }
                    break;
                }
            }
        }
    }

    // Handles in the reap list were live when pushed and nothing erases
    // between the walk and this drain, so each erase succeeds.
    let reaped = state.reap.len() as u64;
    for handle in state.reap.drain(..) {
        let _ = state.voices.erase(handle);
    }

    state.stats.passes += 1;
    state.stats.frames_mixed += frames as u64;
    state.stats.voices_reaped += reaped;

    if let Some(hook) = state.commit.as_mut() {
        hook(out, channels, sample_rate, frames);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::{AudioEngine, DecodedClip, EngineConfig, VoiceSpec};

    fn mono_engine() -> AudioEngine {
        AudioEngine::new(EngineConfig {
            channels: 1,
            sample_rate: 44_100,
            min_volume: 0.0,
            max_volume: 1.0,
        })
    }

    fn playing_spec(source: crate::SourceId) -> VoiceSpec {
        let mut spec = VoiceSpec::new(source);
        spec.playing = true;
        spec
    }

    #[test]
    fn stereo_clip_is_reproduced_exactly_at_unity() {
        let engine = AudioEngine::new(EngineConfig::default());
        let samples = vec![100i16, -100, 2000, -2000, 3000, -3000, 400, -400];
        let source = engine.add_clip(DecodedClip::new(samples.clone(), 2, 44_100));
        let voice = engine.create_voice(playing_spec(source));

        let mut out = vec![0i16; 8];
        engine.mix(&mut out);

        assert_eq!(out, samples);
        // One-shot, non-persistent: gone after the pass that finished it.
        assert!(!engine.voice_exists(voice));
        assert_eq!(engine.voice_count(), 0);
    }

    #[test]
    fn two_identical_voices_double_the_amplitude() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![1000, -1000, 500, -500], 1, 44_100));
        engine.create_voice(playing_spec(source));
        engine.create_voice(playing_spec(source));

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);

        assert_eq!(out, vec![2000, -2000, 1000, -1000]);
    }

    #[test]
    fn accumulation_saturates_instead_of_wrapping() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![30_000, -30_000], 1, 44_100));
        engine.create_voice(playing_spec(source));
        engine.create_voice(playing_spec(source));

        let mut out = vec![0i16; 2];
        engine.mix(&mut out);

        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn looping_voice_wraps_and_keeps_playing() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![10, 20, 30, 40], 1, 44_100));
        let mut spec = playing_spec(source);
        spec.looped = true;
        let voice = engine.create_voice(spec);

        let mut out = vec![0i16; 6];
        engine.mix(&mut out);

        assert_eq!(out, vec![10, 20, 30, 40, 10, 20]);
        assert!(engine.is_playing(voice));
        assert!(engine.voice_exists(voice));
    }

    #[test]
    fn loop_wrap_preserves_fractional_phase() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![0, 1000, 2000, 3000], 1, 44_100));
        let mut spec = playing_spec(source);
        spec.looped = true;
        spec.pitch = 1.5;
        engine.create_voice(spec);

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);

        // Positions 0.0, 1.5, 3.0, then 4.5 wraps to 0.5 — not to 0.0.
        assert_eq!(out, vec![0, 1500, 3000, 500]);
    }

    #[test]
    fn half_pitch_interpolates_between_samples() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![0, 1000], 1, 44_100));
        let mut spec = playing_spec(source);
        spec.pitch = 0.5;
        engine.create_voice(spec);

        let mut out = vec![0i16; 2];
        engine.mix(&mut out);

        assert_eq!(out, vec![0, 500]);
    }

    #[test]
    fn mono_source_fans_out_to_both_stereo_channels() {
        let engine = AudioEngine::new(EngineConfig::default());
        let source = engine.add_clip(DecodedClip::new(vec![700, -700], 1, 44_100));
        engine.create_voice(playing_spec(source));

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);

        assert_eq!(out, vec![700, 700, -700, -700]);
    }

    #[test]
    fn finished_persistent_voice_survives_for_restart() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![10, 20], 1, 44_100));
        let mut spec = playing_spec(source);
        spec.persistent = true;
        let voice = engine.create_voice(spec);

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);
        assert_eq!(&out[..2], &[10, 20]);

        assert!(engine.voice_exists(voice));
        assert!(!engine.is_playing(voice));

        engine.restart(voice);
        engine.play(voice);
        let mut out = vec![0i16; 2];
        engine.mix(&mut out);
        assert_eq!(out, vec![10, 20]);
    }

    #[test]
    fn paused_non_persistent_voice_is_collected() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![10, 20], 1, 44_100));
        let voice = engine.create_voice(VoiceSpec::new(source)); // never started

        let mut out = vec![0i16; 2];
        engine.mix(&mut out);

        assert_eq!(out, vec![0, 0]);
        assert!(!engine.voice_exists(voice));
    }

    #[test]
    fn paused_persistent_voice_is_kept_silent() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![10, 20], 1, 44_100));
        let mut spec = VoiceSpec::new(source);
        spec.persistent = true;
        let voice = engine.create_voice(spec);

        let mut out = vec![0i16; 2];
        engine.mix(&mut out);

        assert_eq!(out, vec![0, 0]);
        assert!(engine.voice_exists(voice));
    }

    #[test]
    fn stale_source_reference_is_skipped_and_voice_collected() {
        let engine = mono_engine();
        let keep = engine.add_clip(DecodedClip::new(vec![100, 200, 300], 1, 44_100));
        let doomed = engine.add_clip(DecodedClip::new(vec![9000, 9000, 9000], 1, 44_100));

        engine.create_voice(playing_spec(keep));
        let stale_voice = engine.create_voice(playing_spec(doomed));
        engine.destroy_source(doomed).unwrap();

        let mut out = vec![0i16; 3];
        engine.mix(&mut out);

        // The surviving voice mixes alone; the stale one is silent and gone.
        assert_eq!(out, vec![100, 200, 300]);
        assert!(!engine.voice_exists(stale_voice));
    }

    #[test]
    fn zero_length_source_finishes_immediately() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(Vec::new(), 1, 44_100));
        let voice = engine.create_voice(playing_spec(source));

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);

        assert_eq!(out, vec![0, 0, 0, 0]);
        assert!(!engine.voice_exists(voice));
    }

    #[test]
    fn volume_bounds_apply_retroactively_at_mix_time() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![1000, 1000], 1, 44_100));
        let mut spec = playing_spec(source);
        spec.persistent = true;
        spec.volume = 2.0;
        let voice = engine.create_voice(spec);

        let mut out = vec![0i16; 2];
        engine.mix(&mut out);
        // Default bounds clamp the stored 2.0 down to 1.0.
        assert_eq!(out, vec![1000, 1000]);

        engine.set_volume_bounds(0.0, 2.0);
        engine.restart(voice);
        engine.play(voice);
        let mut out = vec![0i16; 2];
        engine.mix(&mut out);
        // Same stored volume, wider bounds: the clamp now passes 2.0.
        assert_eq!(out, vec![2000, 2000]);
    }

    #[test]
    fn commit_hook_sees_each_finished_buffer_exactly_once() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![11, 22, 33], 1, 44_100));
        engine.create_voice(playing_spec(source));

        let calls = Arc::new(AtomicUsize::new(0));
        let captured: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
        let hook_calls = Arc::clone(&calls);
        let hook_captured = Arc::clone(&captured);
        engine.set_commit_hook(move |buffer, channels, sample_rate, frames| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(channels, 1);
            assert_eq!(sample_rate, 44_100);
            assert_eq!(frames, buffer.len());
            *hook_captured.lock() = buffer.to_vec();
        });

        let mut out = vec![0i16; 3];
        engine.mix(&mut out);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*captured.lock(), out);

        // Hook still fires on a silent pass.
        engine.mix(&mut out);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        engine.clear_commit_hook();
        engine.mix(&mut out);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stats_accumulate_across_passes() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![1, 2], 1, 44_100));
        engine.create_voice(playing_spec(source));

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);
        engine.mix(&mut out);

        let stats = engine.stats();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.frames_mixed, 8);
        assert_eq!(stats.voices_reaped, 1);
    }

    #[test]
    fn recycled_source_handle_with_stale_position_does_not_read_out_of_bounds() {
        let engine = mono_engine();
        let long = engine.add_clip(DecodedClip::new(vec![100; 64], 1, 44_100));

        let mut spec = playing_spec(long);
        spec.persistent = true;
        let voice = engine.create_voice(spec);

        // Advance the voice partway into the long clip.
        let mut out = vec![0i16; 16];
        engine.mix(&mut out);
        assert!(engine.is_playing(voice));

        // Replace the source; the freed handle is recycled for a clip much
        // shorter than the voice's current position.
        engine.destroy_source(long).unwrap();
        let short = engine.add_clip(DecodedClip::new(vec![7, 7], 1, 44_100));
        assert_eq!(short, long);

        // The voice's position is beyond the new clip: treated as finished,
        // not read out of bounds.
        let mut out = vec![0i16; 4];
        engine.mix(&mut out);
        assert_eq!(out, vec![0, 0, 0, 0]);
        assert!(engine.voice_exists(voice));
        assert!(!engine.is_playing(voice));
    }

    #[test]
    fn many_voices_finishing_in_one_pass_all_get_collected() {
        let engine = mono_engine();
        let source = engine.add_clip(DecodedClip::new(vec![100, 100], 1, 44_100));
        for _ in 0..40 {
            engine.create_voice(playing_spec(source));
        }

        let mut out = vec![0i16; 4];
        engine.mix(&mut out);

        assert_eq!(engine.voice_count(), 0);
        assert_eq!(out[0], 4000);
        assert_eq!(out[2], 0);
    }
}
