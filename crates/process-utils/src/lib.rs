//! Small process-related helpers shared across the workspace.
//!
//! Muxers and the download accelerator are external binaries; everything that
//! spawns them goes through here so Windows never flashes a console window and
//! every child's stderr ends up in the tracing log.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Run `program <arg>` and return the first line of its stdout.
///
/// Used to detect tool versions (`ffmpeg -version`, `MP4Box -version`).
/// Returns `None` when the binary is missing or prints nothing.
pub fn probe_version(program: impl AsRef<OsStr>, arg: &str) -> Option<String> {
    std_command(program)
        .arg(arg)
        .output()
        .ok()
        .and_then(|output| {
            // MP4Box prints its banner on stderr.
            let text = if output.stdout.is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            String::from_utf8(text)
                .ok()
                .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
        })
        .filter(|line| !line.is_empty())
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
pub use captured::{CapturedOutput, run_captured};

#[cfg(feature = "tokio")]
mod captured {
    use std::process::{ExitStatus, Stdio};

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing::{debug, warn};

    /// Exit status plus the stderr lines a child printed.
    #[derive(Debug)]
    pub struct CapturedOutput {
        pub status: ExitStatus,
        pub stderr: Vec<String>,
    }

    impl CapturedOutput {
        /// The last stderr line that mentions an error, or the last line overall.
        pub fn diagnostic(&self) -> String {
            self.stderr
                .iter()
                .rfind(|l| l.to_lowercase().contains("error"))
                .or_else(|| self.stderr.last())
                .cloned()
                .unwrap_or_else(|| format!("process exited with {}", self.status))
        }
    }

    /// Spawn `command`, forward its stderr to tracing and wait for it to exit.
    ///
    /// Stdout is discarded; the tools driven through here report on stderr.
    pub async fn run_captured(
        command: &mut tokio::process::Command,
    ) -> std::io::Result<CapturedOutput> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;

        let reader = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut collected = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.to_lowercase().contains("error") {
                        warn!("stderr: {}", line);
                    } else {
                        debug!("stderr: {}", line);
                    }
                    collected.push(line);
                }
                collected
            })
        });

        let status = child.wait().await?;
        let stderr = match reader {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(CapturedOutput { status, stderr })
    }
}
