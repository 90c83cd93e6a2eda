#![allow(clippy::print_stdout)]

use cat_device::ShutdownSync;
use cat_devkit::EventInfo;
use miette::IntoDiagnostic;
use tokio::sync::mpsc;

use crate::CatConfig;
use crate::session::{build_device, connect, disconnect, runtime};

/// Runs the subcommand for monitoring a title.
pub fn evaluate_monitor(config: String, force: bool) -> miette::Result<()> {
    let config = CatConfig::parse(&config)?;

    runtime()?.block_on(async move {
        let shutdown = ShutdownSync::new();
        let device = build_device(&config, shutdown.clone());

        if config.debug_output {
            device.start_monitoring_debug_output(|line| println!("[debug] {line}"));
        }

        let (failures_tx, mut failures) = mpsc::unbounded_channel();
        device.start_monitoring_title_failures(move |failure| {
            let _ = failures_tx.send(failure);
        });

        connect(&device).await?;

        if !device.connect_debugger(force).await {
            disconnect(&device, &shutdown).await?;
            miette::bail!(
                help = "use --force to take over the console",
                "{} already has a debugger",
                device.name()
            );
        }

        let mut sessions = Vec::with_capacity(config.monitors.len());

        for monitor in &config.monitors {
            let session = device
                .monitor_api(&monitor.symbol, |call| {
                    println!("[call] {} @ {:#010x}", call.symbol, call.address);
                })
                .await
                .into_diagnostic()?;

            if !session.is_symbol_found() {
                tracing::info!(symbol = %monitor.symbol, "symbol not loaded yet");
            }
            sessions.push(session);
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,

                Some(failure) = failures.recv() => {
                    let event = failure.event();

                    println!(
                        "[{}] thread {:?}: {}",
                        failure.failure_name(),
                        event.thread_id(),
                        event.message().unwrap_or_default(),
                    );

                    device.continue_execution(failure).await;
                }
            }
        }

        for session in sessions {
            session.dispose().await;
        }

        device.disconnect_debugger().await;
        disconnect(&device, &shutdown).await
    })
}
