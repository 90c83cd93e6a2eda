use std::sync::Mutex;

use cat_device::{Device, DeviceBuilder, ShutdownSync};
use cat_symbol::SymbolResolver;
use cat_xbdm::XbdmManager;
use miette::IntoDiagnostic;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use crate::CatConfig;

/// Device driven by the CLI.
pub type CliDevice = Device<XbdmManager, SymbolResolver>;

pub(crate) fn runtime() -> miette::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}

pub(crate) fn build_device(config: &CatConfig, shutdown: ShutdownSync) -> CliDevice {
    DeviceBuilder::new()
        .with_manager(XbdmManager::new())
        .with_symbols(SymbolResolver::new(config.symbols_dir()))
        .config(config.device_config())
        .shutdown(shutdown)
        .build(config.console.clone())
}

/// Connects the device, and waits for the first notification of the console.
pub(crate) async fn connect(device: &CliDevice) -> miette::Result<()> {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));

    device
        .connect(move |_, success| {
            let tx = tx.lock().ok().and_then(|mut tx| tx.take());
            if let Some(tx) = tx {
                let _ = tx.send(success);
            }
        })
        .into_diagnostic()?;

    match rx.await {
        Ok(true) => Ok(()),
        _ => Err(miette::miette!("failed to connect to {}", device.name())),
    }
}

/// Tears the session down, and waits for its background work to finish.
pub(crate) async fn disconnect(device: &CliDevice, shutdown: &ShutdownSync) -> miette::Result<()> {
    device.disconnect().into_diagnostic()?;

    if !shutdown.request_shutdown() {
        tracing::debug!(pending = shutdown.pending(), "waiting for background work");
        shutdown.wait_idle().await;
    }

    Ok(())
}
