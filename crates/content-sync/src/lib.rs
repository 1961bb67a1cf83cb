//! Content sync for Bhakti Vani
//!
//! This crate keeps the local document store in step with the remote deity
//! and stotra collections: first-run download, snapshot-backed language
//! switching, watermark-bounded incremental sync, and weekly background sync.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod http;
pub mod remote;
pub mod retry;
pub mod schedule;
pub mod setup;
pub mod test_utils;

pub use engine::{
    DownloadReport, DownloadSource, NetworkState, SnapshotInvalidation, SyncConfig, SyncEngine,
    SyncError, SyncEvent, SyncOperation, SyncOutcome, UpdateCheck,
};
pub use http::{CollectionLayout, HttpContentSource, RemoteConfig};
pub use remote::{RemoteContentSource, RemoteDeity, RemoteError, RemoteStotra};
pub use retry::RetryConfig;
pub use schedule::{AutoSync, AutoSyncResult};
pub use setup::SetupOutcome;
