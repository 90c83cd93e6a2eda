use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cat_device::{DeviceConfig, RebootTimeoutPolicy};
use miette::IntoDiagnostic;

/// Configuration of a session with a console.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct CatConfig {
    /// Name or IP address of the console.
    #[knus(child, unwrap(argument))]
    pub console: String,

    /// Directory containing the symbol files of the title.
    ///
    /// Defaults to the current directory.
    #[knus(child, unwrap(argument))]
    pub symbols: Option<String>,

    /// Name under which to register as the console's debugger.
    #[knus(child, unwrap(argument))]
    pub debugger_name: Option<String>,

    /// Maximum duration of a reboot, in seconds.
    #[knus(child, default = 120, unwrap(argument))]
    pub reboot_timeout: u64,

    /// Fail when a rebooting console does not come back in time.
    #[knus(child)]
    pub strict_reboot: bool,

    /// Print the debug output of the title.
    #[knus(child)]
    pub debug_output: bool,

    /// Functions of the title to monitor.
    #[knus(children(name = "monitor"))]
    pub monitors: Vec<MonitorConfig>,
}

/// Configuration of a monitored function.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct MonitorConfig {
    /// Symbol name of the function.
    #[knus(argument)]
    pub symbol: String,
}

impl CatConfig {
    /// Parses the configuration, either inline or from a `.kdl` file.
    pub fn parse(config: &str) -> miette::Result<Self> {
        let path = Path::new(config);

        let config = if let Some((filename, "kdl")) = path
            .file_name()
            .and_then(OsStr::to_str)
            .zip(path.extension().and_then(OsStr::to_str))
        {
            let content = std::fs::read_to_string(path).into_diagnostic()?;
            knus::parse(filename, &content)?
        } else {
            knus::parse("<content>", config)?
        };

        Ok(config)
    }

    /// Directory in which symbol files are searched.
    pub fn symbols_dir(&self) -> PathBuf {
        self.symbols
            .as_deref()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }

    /// Configuration of the device driving the session.
    pub fn device_config(&self) -> DeviceConfig {
        let mut config = DeviceConfig {
            reboot_timeout: Duration::from_secs(self.reboot_timeout),
            reboot_timeout_policy: if self.strict_reboot {
                RebootTimeoutPolicy::Strict
            } else {
                RebootTimeoutPolicy::BestEffort
            },
            ..DeviceConfig::default()
        };

        if let Some(name) = &self.debugger_name {
            config.debugger_name.clone_from(name);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cat_device::RebootTimeoutPolicy;

    use super::{CatConfig, MonitorConfig};

    #[test]
    fn parse_from_kdl_minimal() {
        let config = knus::parse::<CatConfig>(
            "<content>",
            indoc::indoc! {r#"
                console "192.168.1.20"
            "#},
        )
        .map_err(miette::Report::new)
        .expect("parse kdl");

        assert_eq!(
            config,
            CatConfig {
                console: "192.168.1.20".to_owned(),
                symbols: None,
                debugger_name: None,
                reboot_timeout: 120,
                strict_reboot: false,
                debug_output: false,
                monitors: vec![],
            }
        );

        let device = config.device_config();
        assert_eq!(device.reboot_timeout, Duration::from_secs(120));
        assert_eq!(device.reboot_timeout_policy, RebootTimeoutPolicy::BestEffort);
        assert!(device.debugger_name.starts_with("CAT-"));

        assert!(knus::parse::<CatConfig>("<content>", "").is_err());
    }

    #[test]
    fn parse_from_kdl_full() {
        let config = knus::parse::<CatConfig>(
            "<content>",
            indoc::indoc! {r#"
                console "devkit-04"
                symbols "D:/Builds/MyTitle/Symbols"
                debugger-name "CAT-lab"
                reboot-timeout 30
                strict-reboot
                debug-output
                monitor "XamShowMessageBoxUI"
                monitor "XNotifyQueueUICustom"
            "#},
        )
        .map_err(miette::Report::new)
        .expect("parse kdl");

        assert_eq!(
            config,
            CatConfig {
                console: "devkit-04".to_owned(),
                symbols: Some("D:/Builds/MyTitle/Symbols".to_owned()),
                debugger_name: Some("CAT-lab".to_owned()),
                reboot_timeout: 30,
                strict_reboot: true,
                debug_output: true,
                monitors: vec![
                    MonitorConfig {
                        symbol: "XamShowMessageBoxUI".to_owned(),
                    },
                    MonitorConfig {
                        symbol: "XNotifyQueueUICustom".to_owned(),
                    },
                ],
            }
        );

        let device = config.device_config();
        assert_eq!(device.debugger_name, "CAT-lab");
        assert_eq!(device.reboot_timeout, Duration::from_secs(30));
        assert_eq!(device.reboot_timeout_policy, RebootTimeoutPolicy::Strict);
    }

    #[test]
    fn parse_inline_or_file() {
        let config = CatConfig::parse("console \"devkit-04\"").expect("parse inline");
        assert_eq!(config.symbols_dir().as_os_str(), ".");

        assert!(CatConfig::parse("/nonexistent/cat.kdl").is_err());
    }
}
