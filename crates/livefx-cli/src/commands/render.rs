//! Offline rendering of a WAV file through user code.

use super::common::{UserCode, describe_error, parse_key_val};
use clap::Args;
use livefx_core::{Engine, EngineConfig};
use livefx_io::{render_to_wav, wav_source};
use std::path::PathBuf;

#[derive(Args)]
pub struct RenderArgs {
    /// Input WAV file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Per-sample code
    #[arg(long, value_name = "FILE")]
    code: PathBuf,

    /// Parameter declarations (JSON array)
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Parameter defaults (e.g., "gain=0.5")
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, f32)>,

    /// Output bit depth (16, 24 or 32)
    #[arg(long, default_value = "32")]
    bits: u16,

    /// Extra seconds rendered after the input ends
    #[arg(long, default_value = "0")]
    tail: f32,
}

pub async fn run(args: RenderArgs, config: EngineConfig) -> anyhow::Result<()> {
    let user = UserCode::load(&args.code, args.params.as_deref(), &args.param)?;
    let (source, spec) = wav_source(&args.input, false)?;
    let input_frames = source.len();

    // Render at the file's own rate; the source does not resample.
    let config = EngineConfig {
        sample_rate: spec.sample_rate,
        ..config
    };
    let (engine, mut renderer) = Engine::new(config)?;
    engine.set_source(Some(Box::new(source)))?;
    engine
        .compile(&user.code, &user.params)
        .await
        .map_err(|err| anyhow::anyhow!("{}", describe_error(&err, &user)))?;

    let tail_frames = (args.tail.max(0.0) * spec.sample_rate as f32).round() as usize;
    let frames = input_frames + tail_frames;
    println!(
        "Rendering {} -> {} ({} frames, {} Hz)",
        args.input.display(),
        args.output.display(),
        frames,
        spec.sample_rate
    );
    let written = render_to_wav(&mut renderer, frames, &args.output, args.bits)?;

    if let Some(unit) = engine.active_unit()
        && unit.fault_count() > 0
    {
        tracing::warn!(faults = unit.fault_count(), "unit reported runtime faults");
    }
    println!(
        "Done: {} channel(s), {}-bit",
        written.channels, written.bits_per_sample
    );
    Ok(())
}
