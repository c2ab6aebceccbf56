use std::path::Path;

use async_trait::async_trait;
use pagedl_engine::source::DanmakuConverter;
use pagedl_engine::{Page, TransportError};
use process_utils::{run_captured, tokio_command};
use tracing::debug;

use crate::config::DanmakuConverterConfig;

/// Runs an external converter such as DanmakuFactory.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    config: DanmakuConverterConfig,
}

impl ExternalConverter {
    pub fn new(config: DanmakuConverterConfig) -> Self {
        Self { config }
    }

    fn args(&self, xml: &Path, ass: &Path) -> Vec<String> {
        let input = xml.display().to_string();
        let output = ass.display().to_string();
        self.config
            .args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl DanmakuConverter for ExternalConverter {
    async fn convert(&self, xml: &Path, ass: &Path, page: &Page) -> Result<(), TransportError> {
        let args = self.args(xml, ass);
        debug!(program = %self.config.program, ?args, page = page.index, "Converting danmaku");

        let mut command = tokio_command(&self.config.program);
        command.args(&args);
        let output = run_captured(&mut command)
            .await
            .map_err(|e| TransportError::Accelerator {
                program: self.config.program.clone(),
                reason: format!("failed to spawn: {e}"),
            })?;
        if !output.status.success() {
            return Err(TransportError::Accelerator {
                program: self.config.program.clone(),
                reason: output.diagnostic(),
            });
        }
        if !ass.exists() {
            return Err(TransportError::Accelerator {
                program: self.config.program.clone(),
                reason: format!("{} was not written", ass.display()),
            });
        }
        Ok(())
    }
}
