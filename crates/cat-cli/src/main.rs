#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use cat_cli::{CliAction, CliOpts};

use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().with_env_var("CAT_LOG").from_env_lossy())
        .with_writer(std::io::stderr)
        .init();

    let res = match cli.action {
        CliAction::Monitor { config, force } => cat_cli::evaluate_monitor(config, force),
        CliAction::Reboot {
            config,
            warm,
            no_wait,
            dashboard,
            emulation_pid,
        } => cat_cli::evaluate_reboot(config, warm, no_wait, dashboard, emulation_pid),
        CliAction::Status { config } => cat_cli::evaluate_status(config),
    };

    if let Err(e) = res {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
