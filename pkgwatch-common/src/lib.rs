//! Data model of the pkgwatch status documents.
//!
//! The build producer writes `.data.json` documents in three shapes (one
//! build, a master's build history, the list of masters). This crate decodes
//! them into typed snapshots.

pub mod count;
pub mod snapshot;
pub mod types;

pub use snapshot::{
    BuildSnapshot, BuildSummary, BuiltPort, FailedPort, FetchedPort, IgnoredPort, IndexSnapshot,
    JailBuilds, JailSnapshot, Job, MasterEntry, Ports, QueuedPort, RemainingPort, SkippedPort, Snap,
    Snapshot, SnapshotError, Stats, StatusField,
};
pub use types::{PageKind, PortCategory, ServerStyle};
