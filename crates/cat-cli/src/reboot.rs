#![allow(clippy::print_stdout)]

use cat_device::{DiscEmulation, ShutdownSync};
use miette::IntoDiagnostic;

use crate::session::{CliDevice, build_device, connect, disconnect, runtime};
use crate::CatConfig;

/// Runs the subcommand for rebooting a console.
pub fn evaluate_reboot(
    config: String,
    warm: bool,
    no_wait: bool,
    dashboard: bool,
    emulation_pid: Option<u32>,
) -> miette::Result<()> {
    let config = CatConfig::parse(&config)?;

    runtime()?.block_on(async move {
        let shutdown = ShutdownSync::new();
        let device = build_device(&config, shutdown.clone());

        connect(&device).await?;

        if let Some(pid) = emulation_pid {
            device.track_disc_emulation(DiscEmulation::from_env(pid).into_diagnostic()?);
        }

        let result = reboot(&device, warm, !no_wait, dashboard).await;

        if result.is_ok() {
            println!("{}: {}", device.name(), device.status());
        }

        let disconnected = disconnect(&device, &shutdown).await;
        result.into_diagnostic()?;
        disconnected
    })
}

async fn reboot(device: &CliDevice, warm: bool, wait: bool, dashboard: bool) -> cat_device::Result<()> {
    if !dashboard {
        return device.reboot(!warm, wait).await;
    }

    device.launch_dev_dashboard().await?;

    if wait {
        device.wait_for_reboot_to_complete().await?;
    }

    Ok(())
}
