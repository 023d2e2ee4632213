//! Types for the mount service client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A completed mount: the WebDAV location of the chosen video file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountHandle {
    /// Path of the chosen file below the WebDAV root.
    pub mount_path: String,
    /// Filename of the chosen video.
    pub filename: String,
    /// Size of the chosen video in bytes.
    pub file_size: u64,
    /// Category the job was queued under.
    pub category: String,
    /// The mount service's job id.
    pub job_id: String,
}

/// Errors from mounting or walking the mount service.
///
/// Clone so a failure can be shared by every caller of a single-flight
/// build.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MountError {
    #[error("Mount service error: {0}")]
    Api(String),

    #[error("Mount service timeout")]
    Timeout,

    #[error("Mount job failed: {0}")]
    JobFailed(String),

    #[error("No playable video found in mount: {0}")]
    NoPlayableVideo(String),

    #[error("Mount wait deadline exceeded")]
    WaitDeadline,
}

impl MountError {
    /// Deterministic failures are pinned in the mount cache for the
    /// TTL; transient ones are retried by the next caller.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            MountError::JobFailed(_) | MountError::NoPlayableVideo(_)
        )
    }
}

/// Status of a job in the mount service's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}
