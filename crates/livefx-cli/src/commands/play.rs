//! Real-time playback through user code, with optional live reloading.

use super::common::{UserCode, describe_error, parse_key_val};
use clap::Args;
use livefx_core::{CompileOutcome, Engine, EngineConfig};
use livefx_host::{MediaSource, Oscillator};
use livefx_io::{AudioBackend, BackendStreamConfig, CpalBackend, renderer_callback, wav_source};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const METER_EVERY: u32 = 5;

#[derive(Args)]
pub struct PlayArgs {
    /// WAV file to play
    #[arg(short, long, value_name = "FILE", conflicts_with = "tone")]
    input: Option<PathBuf>,

    /// Play a sine test tone at this frequency instead of a file
    #[arg(long, value_name = "HZ")]
    tone: Option<f32>,

    /// Per-sample code
    #[arg(long, value_name = "FILE")]
    code: PathBuf,

    /// Parameter declarations (JSON array)
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Parameter defaults (e.g., "gain=0.5")
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, f32)>,

    /// Recompile whenever the code or parameter file changes
    #[arg(short, long)]
    watch: bool,

    /// Print the dominant frequency before and after the unit
    #[arg(short, long)]
    meter: bool,

    /// Loop the input file
    #[arg(short, long)]
    r#loop: bool,

    /// Output device (partial name)
    #[arg(short, long)]
    device: Option<String>,

    /// Device buffer size in frames
    #[arg(long, default_value = "512")]
    buffer_size: u32,
}

pub async fn run(args: PlayArgs, mut config: EngineConfig) -> anyhow::Result<()> {
    let mut user = UserCode::load(&args.code, args.params.as_deref(), &args.param)?;

    let file = match &args.input {
        Some(path) => {
            let (source, spec) = wav_source(path, args.r#loop)?;
            println!(
                "Loaded {}: {} frames, {} Hz, {} ch",
                path.display(),
                source.len(),
                spec.sample_rate,
                spec.channels
            );
            config.sample_rate = spec.sample_rate;
            Some((source, spec.sample_rate))
        }
        None => None,
    };

    let backend = CpalBackend::new();
    let mut stream_config = BackendStreamConfig {
        sample_rate: config.sample_rate,
        buffer_size: args.buffer_size,
        channels: config.channels,
        device_name: args.device.clone(),
    };
    let actual = backend.actual_sample_rate(&stream_config);
    if actual != stream_config.sample_rate {
        tracing::warn!(
            requested = stream_config.sample_rate,
            actual,
            "device does not support the requested rate"
        );
        stream_config.sample_rate = actual;
        config.sample_rate = actual;
    }

    let (source, duration): (Box<dyn MediaSource>, Option<Duration>) = match file {
        Some((source, file_rate)) => {
            if file_rate != config.sample_rate {
                tracing::warn!(file_rate, "no resampling; the file will play off-pitch");
            }
            let secs = source.len() as f64 / f64::from(config.sample_rate);
            let duration = (!args.r#loop).then(|| Duration::from_secs_f64(secs));
            (Box::new(source), duration)
        }
        None => {
            let freq = args.tone.unwrap_or(440.0);
            println!("Test tone: {freq} Hz");
            let tone = Oscillator::new(
                freq,
                0.25,
                config.sample_rate as f32,
                usize::from(config.channels),
            );
            (Box::new(tone), None)
        }
    };

    let (engine, renderer) = Engine::new(config)?;
    engine.set_source(Some(source))?;
    compile(&engine, &user).await?;

    let _stream = backend.build_output_stream(
        &stream_config,
        renderer_callback(renderer, stream_config.channels),
        Box::new(|err| tracing::error!(%err, "audio stream error")),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    println!(
        "\nPlaying{}{}... Press Ctrl+C to stop.\n",
        if args.r#loop { " (looping)" } else { "" },
        if args.watch { ", watching for changes" } else { "" }
    );

    let started = Instant::now();
    let mut stamps = Stamps::read(&args.code, args.params.as_deref());
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut tick: u32 = 0;
    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        tick = tick.wrapping_add(1);

        if duration.is_some_and(|d| started.elapsed() > d + POLL_INTERVAL) {
            break;
        }

        if args.watch {
            let now = Stamps::read(&args.code, args.params.as_deref());
            if now != stamps {
                stamps = now;
                match UserCode::load(&args.code, args.params.as_deref(), &args.param) {
                    Ok(reloaded) => {
                        user = reloaded;
                        // Errors keep the previous unit playing.
                        if let Err(err) = compile(&engine, &user).await {
                            eprintln!("{err}");
                        }
                    }
                    Err(err) => eprintln!("{err:#}"),
                }
            }
        }

        if args.meter && tick % METER_EVERY == 0 {
            let bin_hz = engine.config().sample_rate as f32 / engine.config().fft_size as f32;
            let snapshot = engine.snapshot();
            println!(
                "dry {} | wet {}",
                peak_label(snapshot.dry(), bin_hz),
                peak_label(snapshot.wet(), bin_hz)
            );
        }
    }

    println!("\nStopping...");
    Ok(())
}

async fn compile(engine: &Engine, user: &UserCode) -> anyhow::Result<()> {
    match engine.compile(&user.code, &user.params).await {
        Ok(CompileOutcome::Applied { module: Some(module) }) => {
            println!("Compiled {} as module {}", user.path.display(), module);
            Ok(())
        }
        Ok(CompileOutcome::Applied { module: None }) => {
            println!("{} is empty; bypassing", user.path.display());
            Ok(())
        }
        Ok(CompileOutcome::Superseded) => Ok(()),
        Err(err) => anyhow::bail!("{}", describe_error(&err, user)),
    }
}

/// Modification times of the watched files.
#[derive(Debug, PartialEq, Eq)]
struct Stamps(Option<SystemTime>, Option<SystemTime>);

impl Stamps {
    fn read(code: &Path, params: Option<&Path>) -> Self {
        let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
        Self(modified(code), params.and_then(modified))
    }
}

/// Strongest bin of a byte spectrum, as `"<freq> Hz (<level>)"`.
fn peak_label(bins: &[u8], bin_hz: f32) -> String {
    match bins.iter().enumerate().max_by_key(|&(_, &b)| b) {
        Some((idx, &level)) if level > 0 => {
            format!("{:>7.0} Hz ({:>3})", idx as f32 * bin_hz, level)
        }
        _ => format!("{:>16}", "silent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_label_reports_strongest_bin() {
        let mut bins = vec![0u8; 256];
        bins[10] = 200;
        bins[11] = 120;
        let label = peak_label(&bins, 93.75);
        assert!(label.contains("938 Hz"), "{label}");
        assert!(label.contains("200"));
        assert!(peak_label(&[0; 8], 93.75).contains("silent"));
    }

    #[test]
    fn stamps_change_when_files_change() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("fx.lfx");
        let missing = Stamps::read(&code, None);
        assert_eq!(missing, Stamps(None, None));
        std::fs::write(&code, "output[i] = input[i]").unwrap();
        assert_ne!(Stamps::read(&code, None), missing);
    }
}
