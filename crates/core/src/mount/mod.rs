//! Mount service integration.
//!
//! Queues NZBs on the downstream mount service, waits for completion,
//! and resolves the playable video through its WebDAV tree.

mod client;
mod types;
mod webdav;

pub use client::{HistoryJob, MountClient, HISTORY_POLL_INTERVAL, MOUNT_WAIT_DEADLINE};
pub use types::{JobStatus, MountError, MountHandle};
pub use webdav::{choose_video, is_video_name, DavEntry, WebdavClient};

use tracing::debug;

use crate::config::MountConfig;

/// Where the NZB for a mount comes from.
#[derive(Debug, Clone)]
pub enum NzbSource {
    /// Hand the URL to the mount service (`addurl`).
    Url(String),
    /// Upload cached bytes directly (`addfile`); preferred, the exact
    /// bytes triage verified are what gets mounted.
    File { filename: String, body: Vec<u8> },
}

/// API client plus WebDAV walker behind one mount operation.
pub struct MountService {
    client: MountClient,
    webdav: WebdavClient,
}

impl MountService {
    pub fn new(config: MountConfig) -> Self {
        Self {
            client: MountClient::new(config.clone()),
            webdav: WebdavClient::new(config),
        }
    }

    /// Queue, wait, and resolve one mount end to end.
    pub async fn mount(
        &self,
        source: NzbSource,
        category: &str,
        episode: Option<(u32, u32)>,
    ) -> Result<MountHandle, MountError> {
        let job_id = match source {
            NzbSource::Url(url) => self.client.add_url(&url, category).await?,
            NzbSource::File { filename, body } => {
                self.client.add_file(&filename, body, category).await?
            }
        };

        let job = self.client.wait_for_completion(&job_id).await?;

        let root = if !job.storage.is_empty() {
            job.storage.clone()
        } else {
            format!("{category}/{}", job.name)
        };

        let videos = self.webdav.find_videos(&root).await?;
        let chosen = choose_video(&videos, episode)
            .ok_or_else(|| MountError::NoPlayableVideo(root.clone()))?;

        debug!(
            job_id = %job_id,
            path = %chosen.path,
            size = chosen.size,
            "Mount resolved"
        );

        Ok(MountHandle {
            mount_path: chosen.path.clone(),
            filename: chosen.name.clone(),
            file_size: chosen.size,
            category: category.to_string(),
            job_id,
        })
    }

    /// Resolve a mount that already completed (known from history)
    /// without queueing anything.
    pub async fn resolve_existing(
        &self,
        job_id: &str,
        job_name: &str,
        category: &str,
        episode: Option<(u32, u32)>,
    ) -> Result<MountHandle, MountError> {
        let root = format!("{category}/{job_name}");
        let videos = self.webdav.find_videos(&root).await?;
        let chosen = choose_video(&videos, episode)
            .ok_or_else(|| MountError::NoPlayableVideo(root.clone()))?;

        Ok(MountHandle {
            mount_path: chosen.path.clone(),
            filename: chosen.name.clone(),
            file_size: chosen.size,
            category: category.to_string(),
            job_id: job_id.to_string(),
        })
    }

    /// Absolute WebDAV URL for a mounted file.
    pub fn file_url(&self, handle: &MountHandle) -> String {
        self.webdav.file_url(&handle.mount_path)
    }

    /// WebDAV credentials for the proxy's upstream request.
    pub fn webdav_auth(&self) -> (&str, &str) {
        self.webdav.auth()
    }

    /// Completed-history lookup by job name (instant-stream tag).
    pub async fn find_completed(&self, job_name: &str) -> Result<Option<HistoryJob>, MountError> {
        self.client.find_completed(job_name).await
    }

    /// Every completed job currently in history.
    pub async fn completed_jobs(&self) -> Result<Vec<HistoryJob>, MountError> {
        Ok(self
            .client
            .history()
            .await?
            .into_iter()
            .filter(|j| j.status == JobStatus::Completed)
            .collect())
    }
}
