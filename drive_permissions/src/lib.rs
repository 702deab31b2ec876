//! drive_permissions - audit who a Google Drive account shares its files with.
//!
//! The audit runs in two passes:
//! - List every file visible to the account and write the raw listing to
//!   `AllFiles.csv`
//! - Fetch each file's permissions and write one summary row per file to
//!   `FilePermissions.csv`, naming the users and public links it is shared with
//!
//! # Example
//!
//! ```no_run
//! use drive_permissions::{report, CredentialStore, DriveClient, FlowOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = CredentialStore::new(CredentialStore::default_path()?);
//!     let auth = drive_permissions::oauth::authorize_user(
//!         "client_secret.json",
//!         store,
//!         FlowOptions::default(),
//!     )
//!     .await?;
//!
//!     let client = DriveClient::new(auth);
//!     let outcome = report::run(&client, &report::ReportOptions::default()).await?;
//!     println!("{} files audited", outcome.rows_written);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod credential_store;
pub mod enricher;
pub mod enumerator;
pub mod error;
pub mod models;
pub mod oauth;
pub mod permissions;
pub mod report;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::{DriveClient, RetryPolicy};
pub use credential_store::{CredentialStore, StoredCredential};
pub use enricher::{EnricherConfig, PermissionEnricher};
pub use enumerator::{EnumeratorConfig, FileEnumerator};
pub use error::{DriveError, Result};
pub use models::{FileRecord, PermissionEntry};
pub use oauth::FlowOptions;
pub use permissions::{FileSummary, ItemType};
