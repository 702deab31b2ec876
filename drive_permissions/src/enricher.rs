//! Looks up each file's permissions and reduces them to report rows.

use std::time::Duration;

use tracing::debug;

use crate::client::DriveClient;
use crate::error::Result;
use crate::models::FileRecord;
use crate::permissions::{summarize, FileSummary};

/// Pause between detail calls unless configured otherwise.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct EnricherConfig {
    /// Sleep after every detail call to stay under the API quota.
    pub delay: Duration,
    /// Skip files whose `shared` flag is false.
    pub shared_only: bool,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            shared_only: false,
        }
    }
}

pub struct PermissionEnricher<'a> {
    client: &'a DriveClient,
    current_email: String,
    config: EnricherConfig,
}

impl<'a> PermissionEnricher<'a> {
    /// `current_email` is the authenticated account; its own grants are
    /// never reported.
    pub fn new(client: &'a DriveClient, current_email: impl Into<String>, config: EnricherConfig) -> Self {
        Self {
            client,
            current_email: current_email.into(),
            config,
        }
    }

    /// One summary per file, in input order. The first failed lookup aborts
    /// the whole pass.
    pub async fn enrich(&self, files: &[FileRecord]) -> Result<Vec<FileSummary>> {
        let mut output = Vec::with_capacity(files.len());

        for (idx, file) in files.iter().enumerate() {
            let detail = self.client.get_file_detail(&file.id).await?;

            if !self.config.shared_only || detail.shared {
                let summary = summarize(&detail, &self.current_email);
                debug!(
                    index = idx + 1,
                    total = files.len(),
                    item_type = %summary.item_type,
                    name = %summary.file_name,
                    "Summarized permissions"
                );
                output.push(summary);
            }

            if !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        Ok(output)
    }
}
