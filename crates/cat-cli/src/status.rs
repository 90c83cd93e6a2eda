#![allow(clippy::print_stdout)]

use cat_device::ShutdownSync;
use cat_devkit::{Console, DebugTarget};
use miette::IntoDiagnostic;

use crate::CatConfig;
use crate::session::{build_device, connect, disconnect, runtime};

/// Runs the subcommand for showing the status of a console.
pub fn evaluate_status(config: String) -> miette::Result<()> {
    let config = CatConfig::parse(&config)?;

    runtime()?.block_on(async move {
        let shutdown = ShutdownSync::new();
        let device = build_device(&config, shutdown.clone());

        connect(&device).await?;

        let console = device
            .console()
            .ok_or_else(|| miette::miette!("{} disconnected", device.name()))?;

        let name = console.find_console().await.into_diagnostic()?;
        let owner = console.debugger_owner().await.into_diagnostic()?;
        let processes = device.running_processes().await.into_diagnostic()?;

        println!("console:   {name} ({})", device.name());
        println!("status:    {}", device.status());

        match owner {
            Some(owner) => match owner.user {
                Some(user) => println!("debugger:  {} ({user})", owner.name),
                None => println!("debugger:  {}", owner.name),
            },
            None => println!("debugger:  none"),
        }

        println!("processes:");
        for process in processes {
            println!("  {process}");
        }

        drop(console);
        disconnect(&device, &shutdown).await
    })
}
