//! Pages through files.list until the listing is exhausted.

use tracing::{debug, info};

use crate::client::DriveClient;
use crate::error::Result;
use crate::models::FileRecord;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnumeratorConfig {
    /// Trace every continuation token as it is followed.
    pub debug: bool,
}

pub struct FileEnumerator<'a> {
    client: &'a DriveClient,
    config: EnumeratorConfig,
}

impl<'a> FileEnumerator<'a> {
    pub fn new(client: &'a DriveClient, config: EnumeratorConfig) -> Self {
        Self { client, config }
    }

    /// Every file visible to the account, pages concatenated in the order the
    /// API returned them.
    ///
    /// There is no page limit: an endpoint that keeps handing out tokens keeps
    /// this looping.
    pub async fn retrieve_all(&self) -> Result<Vec<FileRecord>> {
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.client.list_page(page_token.as_deref()).await?;
            pages += 1;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) => {
                    if self.config.debug {
                        debug!("Page Token: {}", token);
                    }
                    page_token = Some(token);
                }
                None => break,
            }
        }

        info!(files = all_files.len(), pages, "Listed all files");
        Ok(all_files)
    }
}
