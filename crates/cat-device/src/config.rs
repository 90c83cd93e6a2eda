use std::time::Duration;

/// Behavior when a rebooting console does not come back in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootTimeoutPolicy {
    /// Assume the console is back, and carry on as if the reboot completed.
    #[default]
    BestEffort,

    /// Fail with [Error::RebootTimedOut](crate::Error::RebootTimedOut).
    Strict,
}

/// Configuration of a [Device](crate::Device).
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Name under which this process registers as the console's debugger.
    pub debugger_name: String,

    /// Delay before tearing down a session or a debugger attachment, so that
    /// in-flight notifications are processed first.
    pub disconnect_grace: Duration,

    /// Delay between a reboot request and the first availability probe.
    pub reboot_settle_delay: Duration,

    /// Delay between two availability probes.
    pub probe_interval: Duration,

    /// Delay between the console re-appearing and the second probing phase.
    pub reappear_delay: Duration,

    /// Delay between two polls of the running processes.
    pub process_poll_interval: Duration,

    /// Maximum duration of a reboot.
    pub reboot_timeout: Duration,

    /// Behavior when [reboot_timeout](Self::reboot_timeout) elapses.
    pub reboot_timeout_policy: RebootTimeoutPolicy,

    /// Processes, one of which runs once the console finished booting.
    pub shell_processes: Vec<String>,

    /// Process running while the boot animation plays.
    pub boot_animation_process: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            debugger_name: format!("CAT-{}", std::process::id()),
            disconnect_grace: Duration::from_secs(1),
            reboot_settle_delay: Duration::from_secs(5),
            probe_interval: Duration::from_millis(500),
            reappear_delay: Duration::from_secs(4),
            process_poll_interval: Duration::from_secs(1),
            reboot_timeout: Duration::from_secs(120),
            reboot_timeout_policy: RebootTimeoutPolicy::default(),
            shell_processes: vec!["xshell.xex".to_owned(), "default.xex".to_owned()],
            boot_animation_process: "bootanim.xex".to_owned(),
        }
    }
}

impl DeviceConfig {
    /// Returns whether the given running processes show a fully booted
    /// console.
    pub fn is_boot_complete<'a>(&self, processes: impl IntoIterator<Item = &'a str>) -> bool {
        let mut shell_running = false;

        for process in processes {
            if process.eq_ignore_ascii_case(&self.boot_animation_process) {
                return false;
            }

            shell_running |= self
                .shell_processes
                .iter()
                .any(|shell| process.eq_ignore_ascii_case(shell));
        }

        shell_running
    }
}
