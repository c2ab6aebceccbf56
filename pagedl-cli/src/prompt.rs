use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use pagedl_engine::source::TrackPrompt;
use tracing::warn;

/// Reads track indices from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl TrackPrompt for StdinPrompt {
    async fn choose(&self, label: &str, count: usize) -> Option<i64> {
        let question = format!("Select {label} stream [0-{}]: ", count.saturating_sub(1));
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            let _ = write!(stderr, "{question}");
            let _ = stderr.flush();
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_index(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read selection, using the first stream");
                None
            }
            Err(e) => {
                warn!(error = %e, "Prompt task failed");
                None
            }
        }
    }
}

fn parse_index(line: &str) -> Option<i64> {
    line.trim().parse().ok()
}
