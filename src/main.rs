#[cfg(not(feature = "playback"))]
fn main() {
    eprintln!(
        "The polymix CLI requires the \"playback\" feature. Rebuild with `--features playback` to enable audio output."
    );
}

#[cfg(feature = "playback")]
fn main() -> anyhow::Result<()> {
    cli::run()
}

#[cfg(feature = "playback")]
mod cli {
    use std::env;
    use std::thread;
    use std::time::Duration;

    use anyhow::{bail, Context};
    use polymix::{AudioEngine, EngineConfig, OutputDevice, VoiceSpec};

    const USAGE: &str =
        "usage: polymix [--loop] [--volume V] [--pitch P] [--record OUT.wav] FILE...";

    struct Args {
        files: Vec<String>,
        volume: f32,
        pitch: f32,
        looped: bool,
        record: Option<String>,
    }

    fn parse_args() -> anyhow::Result<Args> {
        let mut args = Args {
            files: Vec::new(),
            volume: 1.0,
            pitch: 1.0,
            looped: false,
            record: None,
        };

        let mut argv = env::args().skip(1);
        while let Some(arg) = argv.next() {
            match arg.as_str() {
                "--loop" => args.looped = true,
                "--volume" => {
                    let value = argv.next().context("--volume needs a value")?;
                    args.volume = value.parse().context("--volume expects a number")?;
                }
                "--pitch" => {
                    let value = argv.next().context("--pitch needs a value")?;
                    args.pitch = value.parse().context("--pitch expects a number")?;
                }
                "--record" => {
                    args.record = Some(argv.next().context("--record needs a path")?);
                }
                "--help" | "-h" => bail!("{USAGE}"),
                other if other.starts_with('-') => bail!("unknown option '{other}'\n{USAGE}"),
                file => args.files.push(file.to_string()),
            }
        }
        Ok(args)
    }

    pub fn run() -> anyhow::Result<()> {
        env_logger::init();
        let args = parse_args()?;
        if args.files.is_empty() {
            bail!("{USAGE}");
        }

        let engine = AudioEngine::new(EngineConfig::default());
        let device = OutputDevice::open(&engine).context("failed to open audio output")?;

        let recorder = match &args.record {
            Some(path) => Some(start_recorder(&engine, &device, path)?),
            None => None,
        };

        for file in &args.files {
            let source = engine
                .load(file)
                .with_context(|| format!("failed to load '{file}'"))?;
            let info = engine
                .source_info(source)
                .context("source vanished after load")?;
            println!(
                "playing {file} ({} ch @ {} Hz, {:.1}s{})",
                info.channels,
                info.sample_rate,
                info.duration_secs(),
                if args.looped { ", looping" } else { "" }
            );

            let mut spec = VoiceSpec::new(source);
            spec.volume = args.volume;
            spec.pitch = args.pitch;
            spec.looped = args.looped;
            spec.playing = true;
            let voice = engine.create_voice(spec);

            // A looping voice never finishes; wait for ctrl-c in that case.
            while engine.is_playing(voice) {
                thread::sleep(Duration::from_millis(50));
            }
            engine.destroy_source(source).ok();
        }

        if let Some(recorder) = recorder {
            recorder.finish()?;
        }
        drop(device);
        Ok(())
    }

    #[cfg(feature = "wav")]
    struct Recorder {
        writer: std::sync::Arc<parking_lot::Mutex<Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>>>,
        path: String,
    }

    #[cfg(feature = "wav")]
    impl Recorder {
        fn finish(self) -> anyhow::Result<()> {
            if let Some(writer) = self.writer.lock().take() {
                writer.finalize().context("failed to finalize recording")?;
            }
            println!("recorded output to {}", self.path);
            Ok(())
        }
    }

    /// Tap every finished mixer pass into a WAV file via the commit hook.
    #[cfg(feature = "wav")]
    fn start_recorder(
        engine: &AudioEngine,
        device: &OutputDevice,
        path: &str,
    ) -> anyhow::Result<Recorder> {
        use std::sync::Arc;

        let spec = hound::WavSpec {
            channels: device.channels(),
            sample_rate: device.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("failed to create '{path}'"))?;
        let writer = Arc::new(parking_lot::Mutex::new(Some(writer)));

        let hook_writer = Arc::clone(&writer);
        engine.set_commit_hook(move |buffer, _channels, _rate, _frames| {
            if let Some(writer) = hook_writer.lock().as_mut() {
                for &sample in buffer {
                    // Write errors drop the recording, never the stream.
                    if writer.write_sample(sample).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Recorder {
            writer,
            path: path.to_string(),
        })
    }

    #[cfg(not(feature = "wav"))]
    struct Recorder;

    #[cfg(not(feature = "wav"))]
    impl Recorder {
        fn finish(self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[cfg(not(feature = "wav"))]
    fn start_recorder(
        _engine: &AudioEngine,
        _device: &OutputDevice,
        _path: &str,
    ) -> anyhow::Result<Recorder> {
        bail!("--record requires the \"wav\" feature")
    }
}
