//! External `aria2c` backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_captured, tokio_command};
use tokio::fs;
use tracing::{debug, info, instrument};

use super::Fetcher;
use crate::config::DownloadConfig;
use crate::error::TransportError;

/// Connection flags used unless the user passes their own arguments.
const DEFAULT_CONNECTION_ARGS: &[&str] = &["-x16", "-s16", "-j16", "-k5M"];

const BASE_ARGS: &[&str] = &[
    "--auto-file-renaming=false",
    "--download-result=hide",
    "--allow-overwrite=true",
    "--console-log-level=warn",
];

/// Delegates each download to an `aria2c` process.
#[derive(Debug, Clone)]
pub struct Aria2cBackend {
    program: String,
    extra_args: Vec<String>,
    headers: Vec<(String, String)>,
}

impl Aria2cBackend {
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            program: config.accelerator_path.clone(),
            extra_args: config.accelerator_args.clone(),
            headers: config.headers(),
        }
    }

    fn build_args(&self, url: &str, dest: &Path) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(|s| s.to_string()).collect();

        if self.extra_args.is_empty() {
            args.extend(DEFAULT_CONNECTION_ARGS.iter().map(|s| s.to_string()));
        } else {
            args.extend(self.extra_args.iter().cloned());
        }

        for (name, value) in &self.headers {
            args.push(format!("--header={name}: {value}"));
        }

        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        args.push(format!("--dir={}", dir.display()));
        args.push(format!("--out={file_name}"));
        args.push(url.to_string());
        args
    }

    fn failure(&self, reason: impl Into<String>) -> TransportError {
        TransportError::Accelerator {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }
}

/// aria2c keeps `{dest}.aria2` around while a download is unfinished.
fn control_file(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".aria2");
    PathBuf::from(name)
}

#[async_trait]
impl Fetcher for Aria2cBackend {
    fn name(&self) -> &'static str {
        "aria2c"
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let args = self.build_args(url, dest);
        debug!(program = %self.program, ?args, "Spawning accelerator");

        let mut command = tokio_command(&self.program);
        command.args(&args);
        let output = run_captured(&mut command)
            .await
            .map_err(|e| self.failure(format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            return Err(self.failure(output.diagnostic()));
        }

        if fs::try_exists(control_file(dest)).await.unwrap_or(false) {
            return Err(self.failure("download left an unfinished control file"));
        }
        let bytes = match fs::metadata(dest).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => return Err(self.failure("output file is empty")),
            Err(_) => return Err(self.failure("output file is missing")),
        };

        info!(path = %dest.display(), bytes, "Download complete");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(extra: &[&str]) -> Aria2cBackend {
        let config = DownloadConfig {
            accelerator_args: extra.iter().map(|s| s.to_string()).collect(),
            referer: None,
            user_agent: "ua".to_string(),
            ..Default::default()
        };
        Aria2cBackend::new(&config)
    }

    #[test]
    fn test_default_args() {
        let args = backend(&[]).build_args("https://cdn/v.m4s", Path::new("out/BV1/v.mp4"));
        assert!(args.contains(&"-x16".to_string()));
        assert!(args.contains(&"--allow-overwrite=true".to_string()));
        assert!(args.contains(&"--header=User-Agent: ua".to_string()));
        assert!(args.contains(&"--out=v.mp4".to_string()));
        assert!(args.contains(&format!("--dir={}", Path::new("out/BV1").display())));
        assert_eq!(args.last().map(String::as_str), Some("https://cdn/v.m4s"));
    }

    #[test]
    fn test_user_args_replace_connection_flags() {
        let args = backend(&["-x4"]).build_args("u", Path::new("v.mp4"));
        assert!(args.contains(&"-x4".to_string()));
        assert!(!args.contains(&"-x16".to_string()));
        assert!(args.contains(&"--dir=.".to_string()));
    }

    #[cfg(unix)]
    fn fake_aria2c(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-aria2c");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_accepts_written_output() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_aria2c(
            dir.path(),
            r#"for a in "$@"; do case "$a" in --dir=*) d="${a#--dir=}";; --out=*) o="${a#--out=}";; esac; done
printf 'payload' > "$d/$o""#,
        );
        let backend = Aria2cBackend {
            program,
            extra_args: Vec::new(),
            headers: Vec::new(),
        };
        let dest = dir.path().join("track.m4a");

        let bytes = backend.fetch("https://cdn/a.m4s", &dest).await.unwrap();
        assert_eq!(bytes, 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_rejects_failure_and_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.m4a");

        let failing = Aria2cBackend {
            program: fake_aria2c(dir.path(), "echo 'errorCode=22 boom' >&2; exit 22"),
            extra_args: Vec::new(),
            headers: Vec::new(),
        };
        let err = failing.fetch("u", &dest).await.unwrap_err();
        assert!(matches!(err, TransportError::Accelerator { .. }));
        assert!(err.to_string().contains("errorCode=22"));

        let silent = Aria2cBackend {
            program: fake_aria2c(dir.path(), "exit 0"),
            extra_args: Vec::new(),
            headers: Vec::new(),
        };
        let err = silent.fetch("u", &dest).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
