//! Compile user code and report errors without producing audio.

use super::common::{UserCode, describe_error, parse_key_val};
use clap::Args;
use livefx_core::{CompileOutcome, Engine, EngineConfig, codegen};
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Per-sample code
    #[arg(long, value_name = "FILE")]
    code: PathBuf,

    /// Parameter declarations (JSON array)
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Parameter defaults (e.g., "gain=0.5")
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, f32)>,

    /// Print the generated unit module
    #[arg(long)]
    emit: bool,
}

pub async fn run(args: CheckArgs, config: EngineConfig) -> anyhow::Result<()> {
    let user = UserCode::load(&args.code, args.params.as_deref(), &args.param)?;

    if args.emit {
        print!("{}", codegen::generate(&user.code, &user.params));
    }

    // The renderer stays alive so the swap can commit; nothing pulls it.
    let (engine, _renderer) = Engine::new(config)?;
    match engine.compile(&user.code, &user.params).await {
        Ok(CompileOutcome::Applied { module: Some(module) }) => {
            println!(
                "{}: ok (module {}, {} parameter(s))",
                user.path.display(),
                module,
                user.params.len()
            );
            Ok(())
        }
        Ok(_) => {
            println!("{}: empty, the unit would be bypassed", user.path.display());
            Ok(())
        }
        Err(err) => anyhow::bail!("{}", describe_error(&err, &user)),
    }
}
