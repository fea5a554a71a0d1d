use pkgwatch_common::SnapshotError;

/// Conditions that stop the monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid request. Mastername and Build required.")]
    MissingBuild,

    #[error("Invalid request. Mastername required.")]
    MissingMastername,

    #[error("Invalid request or no data available yet.")]
    NoDataAvailable { attempts: u32 },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
