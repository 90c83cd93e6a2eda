//! Crate implementing the CLI commands.

mod cli;
mod config;
mod monitor;
mod reboot;
mod session;
mod status;

pub use self::cli::{CliAction, CliOpts};
pub use self::config::{CatConfig, MonitorConfig};
pub use self::monitor::evaluate_monitor;
pub use self::reboot::evaluate_reboot;
pub use self::session::CliDevice;
pub use self::status::evaluate_status;
