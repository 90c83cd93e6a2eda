/// CAT, the Xbox 360 devkit companion.
#[derive(clap::Parser)]
#[clap(name = "cat")]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to attach to a console and monitor the running title.
    ///
    /// Runs until interrupted (Ctrl-C).
    Monitor {
        /// Session configuration (KDL format).
        ///
        /// If it ends with `.kdl`, it is treated as a path to a configuration
        /// file. Otherwise it is directly parsed as inline KDL-formatted
        /// configuration.
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,

        /// Register as the console's debugger even if another one is.
        #[clap(long)]
        force: bool,
    },

    /// Command to reboot a console.
    Reboot {
        /// Session configuration (KDL format).
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,

        /// Perform a warm reboot instead of a cold one.
        #[clap(long, conflicts_with = "dashboard")]
        warm: bool,

        /// Return as soon as the reboot is requested.
        #[clap(long)]
        no_wait: bool,

        /// Reboot into the development dashboard.
        #[clap(long)]
        dashboard: bool,

        /// ID of a disc emulation process to stop beforehand.
        ///
        /// The emulator tools are looked up in the XDK pointed to by the
        /// `XEDK` environment variable.
        #[clap(long, value_name = "PID")]
        emulation_pid: Option<u32>,
    },

    /// Command to show the status of a console.
    Status {
        /// Session configuration (KDL format).
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,
    },
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
