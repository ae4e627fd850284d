//! # Firestore realtime listeners for Rust
//!
//! Library keeps a live, ordered view of Google Firestore query results
//! (or of a single document) over the Firestore `Listen` stream:
//! - Canonical Firestore ordering of values and document paths;
//! - Ordered in-memory index of the matching documents, updated only on server checkpoints;
//! - Snapshots with the list of added/modified/removed documents and their positions;
//! - Automatic reconnects from the last resume token, exponential backoff for transient errors;
//! - Full async based on Tokio runtime;
//! - Google client based on [gcloud-sdk library](https://github.com/abdolence/gcloud-sdk-rs)
//!   that automatically detects GKE environment or application default accounts for local development;
//!
//! ## Example:
//!
//! ```rust,no_run
//!use firestore_watch::*;
//!
//!pub fn config_env_var(name: &str) -> Result<String, String> {
//!    std::env::var(name).map_err(|e| format!("{}: {}", name, e))
//!}
//!
//!#[tokio::main]
//!async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!   let db = FirestoreDb::new(&config_env_var("PROJECT_ID")?).await?;
//!
//!   let query = db
//!       .listen_query("cities")
//!       .with_order_by(vec![("population", FirestoreQueryDirection::Descending).into()]);
//!
//!   let mut listener = db.create_query_listener(query)?;
//!
//!   listener
//!       .start(|snapshot| async move {
//!           for change in snapshot.changes.iter() {
//!               println!("{:?}: {}", change.change_type, change.path());
//!           }
//!           Ok(())
//!       })
//!       .await?;
//!
//!   tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!
//!   listener.shutdown().await?;
//!
//!   Ok(())
//!}
//! ```

#![allow(clippy::new_without_default)]
#![forbid(unsafe_code)]

pub mod errors;
mod firestore_value;
pub use firestore_value::*;

mod db;
pub use db::*;

mod listener;
pub use listener::*;

pub mod timestamp_utils;

use crate::errors::FirestoreError;

pub type FirestoreResult<T> = std::result::Result<T, FirestoreError>;

pub type FirestoreDocument = gcloud_sdk::google::firestore::v1::Document;

mod firestore_document_functions;
pub use firestore_document_functions::*;
