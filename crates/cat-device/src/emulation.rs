use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable pointing to the XDK installation.
pub const XDK_ENV_VAR: &str = "XEDK";

const EMULATOR_TOOL: &str = "xbEmulate.exe";

/// Time needed by the emulator to release the console once told to quit.
const QUIT_DELAY: Duration = Duration::from_secs(9);

/// Disc emulation session running on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscEmulation {
    process_id: u32,
    tool_dir: PathBuf,
}

impl DiscEmulation {
    /// Tracks the emulator process with the given ID, whose tools are looked
    /// up in the XDK pointed to by the environment.
    pub fn from_env(process_id: u32) -> Result<Self> {
        let xdk = std::env::var_os(XDK_ENV_VAR).ok_or(Error::XdkNotFound)?;

        Ok(Self::new(process_id, Path::new(&xdk).join("bin").join("win32")))
    }

    /// Tracks the emulator process with the given ID, whose tools are located
    /// in `tool_dir`.
    pub fn new(process_id: u32, tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            process_id,
            tool_dir: tool_dir.into(),
        }
    }

    /// ID of the emulator process.
    pub const fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Path of the tool controlling the emulator.
    pub fn tool_path(&self) -> PathBuf {
        self.tool_dir.join(EMULATOR_TOOL)
    }

    /// Tells the emulator to quit, and waits for it to release the console.
    #[tracing::instrument(name = "StopEmulation", skip(self), fields(pid = self.process_id))]
    pub async fn stop(&self) -> Result<()> {
        let tool = self.tool_path();

        if !tokio::fs::try_exists(&tool).await.unwrap_or(false) {
            return Err(Error::MissingTool(tool));
        }

        let status = tokio::process::Command::new(&tool)
            .arg("/nologo")
            .arg("/Quit")
            .arg("/Process")
            .arg(self.process_id.to_string())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Tool(tool.clone(), e))?;

        if !status.success() {
            return Err(Error::ToolFailed(tool, status));
        }

        tracing::debug!("disc emulation stopped");
        tokio::time::sleep(QUIT_DELAY).await;

        Ok(())
    }
}
