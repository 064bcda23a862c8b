//! Audio device listing.

use clap::Args;
use livefx_io::{AudioBackend, CpalBackend};

#[derive(Args)]
pub struct DevicesArgs {
    /// Only show the default output device
    #[arg(long)]
    default: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let backend = CpalBackend::new();

    if args.default {
        match backend.default_output_device()? {
            Some(device) => println!("{} ({} Hz)", device.name, device.default_sample_rate),
            None => println!("No default output device."),
        }
        return Ok(());
    }

    let devices = backend.list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    let default_name = backend.default_output_device()?.map(|d| d.name);
    println!("Output Devices ({})", backend.name());
    println!("==============\n");
    for (idx, device) in devices.iter().enumerate() {
        let marker = if default_name.as_deref() == Some(device.name.as_str()) {
            " (default)"
        } else {
            ""
        };
        let channels = device
            .default_channels
            .map_or_else(String::new, |c| format!(", {c} ch"));
        println!(
            "  [{}] {} ({} Hz{}){}",
            idx, device.name, device.default_sample_rate, channels, marker
        );
    }
    println!();
    println!("Tip: pass a partial name with --device:");
    println!("  livefx play --tone 440 --code fx.lfx --device \"USB\"");
    Ok(())
}
