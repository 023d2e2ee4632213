//! Mount service API client.
//!
//! The mount service turns an NZB into a WebDAV-addressable file. Its
//! API is SABnzbd-shaped: `addurl` / `addfile` queue a job, `history`
//! reports job state.

use std::time::{Duration, Instant};

use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MountConfig;

use super::{JobStatus, MountError};

/// HTTP timeout for one API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for a job.
pub const HISTORY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Overall deadline for one mount wait.
pub const MOUNT_WAIT_DEADLINE: Duration = Duration::from_secs(80);

/// One history slot.
#[derive(Debug, Clone)]
pub struct HistoryJob {
    pub nzo_id: String,
    pub name: String,
    pub status: JobStatus,
    pub fail_message: String,
    pub category: String,
    /// Directory of the completed job below the WebDAV root.
    pub storage: String,
}

/// Mount service client.
pub struct MountClient {
    client: Client,
    config: MountConfig,
}

impl MountClient {
    pub fn new(config: MountConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn api_url(&self, mode: &str) -> String {
        format!(
            "{}/api?mode={}&apikey={}&output=json",
            self.config.url.trim_end_matches('/'),
            mode,
            urlencoding::encode(&self.config.api_key)
        )
    }

    /// Queue a mount from a download URL. Returns the job id.
    pub async fn add_url(&self, nzb_url: &str, category: &str) -> Result<String, MountError> {
        let url = format!(
            "{}&name={}&cat={}",
            self.api_url("addurl"),
            urlencoding::encode(nzb_url),
            urlencoding::encode(category)
        );
        debug!(category = category, "Queueing mount via addurl");

        let response = self.client.get(&url).send().await.map_err(to_mount_error)?;
        parse_add_response(response).await
    }

    /// Queue a mount by uploading the NZB body directly. Preferred over
    /// `addurl` when the verified bytes are already in hand.
    pub async fn add_file(
        &self,
        filename: &str,
        body: Vec<u8>,
        category: &str,
    ) -> Result<String, MountError> {
        let url = format!(
            "{}&cat={}",
            self.api_url("addfile"),
            urlencoding::encode(category)
        );
        debug!(category = category, filename = filename, "Queueing mount via addfile");

        let part = multipart::Part::bytes(body)
            .file_name(filename.to_string())
            .mime_str("application/x-nzb")
            .map_err(|e| MountError::Api(e.to_string()))?;
        let form = multipart::Form::new().part("name", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(to_mount_error)?;
        parse_add_response(response).await
    }

    /// Fetch the history list.
    pub async fn history(&self) -> Result<Vec<HistoryJob>, MountError> {
        let response = self
            .client
            .get(self.api_url("history"))
            .send()
            .await
            .map_err(to_mount_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MountError::Api(format!("HTTP {status}")));
        }

        let payload: HistoryResponse = response
            .json()
            .await
            .map_err(|e| MountError::Api(format!("Malformed history payload: {e}")))?;

        Ok(payload
            .history
            .slots
            .into_iter()
            .map(|slot| HistoryJob {
                nzo_id: slot.nzo_id,
                name: slot.name,
                status: parse_job_status(&slot.status),
                fail_message: slot.fail_message.unwrap_or_default(),
                category: slot.category.unwrap_or_default(),
                storage: slot.storage.unwrap_or_default(),
            })
            .collect())
    }

    /// Poll history until the job completes or fails, bounded by the
    /// mount wait deadline.
    pub async fn wait_for_completion(&self, job_id: &str) -> Result<HistoryJob, MountError> {
        let start = Instant::now();

        loop {
            if start.elapsed() >= MOUNT_WAIT_DEADLINE {
                return Err(MountError::WaitDeadline);
            }

            match self.history().await {
                Ok(jobs) => {
                    if let Some(job) = jobs.into_iter().find(|j| j.nzo_id == job_id) {
                        match job.status {
                            JobStatus::Completed => return Ok(job),
                            JobStatus::Failed => {
                                return Err(MountError::JobFailed(if job.fail_message.is_empty() {
                                    "mount job failed".to_string()
                                } else {
                                    job.fail_message
                                }));
                            }
                            JobStatus::Queued | JobStatus::Downloading => {}
                        }
                    }
                }
                Err(e) => {
                    // Transient history hiccups do not abort the wait.
                    warn!(error = %e, "History poll failed, retrying");
                }
            }

            tokio::time::sleep(HISTORY_POLL_INTERVAL).await;
        }
    }

    /// Look for an already-completed job whose name matches; powers the
    /// instant-stream tag.
    pub async fn find_completed(&self, job_name: &str) -> Result<Option<HistoryJob>, MountError> {
        let jobs = self.history().await?;
        Ok(jobs
            .into_iter()
            .find(|j| j.status == JobStatus::Completed && j.name.eq_ignore_ascii_case(job_name)))
    }
}

fn to_mount_error(e: reqwest::Error) -> MountError {
    if e.is_timeout() {
        MountError::Timeout
    } else {
        MountError::Api(e.to_string())
    }
}

async fn parse_add_response(response: reqwest::Response) -> Result<String, MountError> {
    let status = response.status();
    if !status.is_success() {
        return Err(MountError::Api(format!("HTTP {status}")));
    }

    let payload: AddResponse = response
        .json()
        .await
        .map_err(|e| MountError::Api(format!("Malformed add payload: {e}")))?;

    if !payload.status {
        return Err(MountError::JobFailed(
            payload.error.unwrap_or_else(|| "add rejected".to_string()),
        ));
    }

    payload
        .nzo_ids
        .into_iter()
        .next()
        .ok_or_else(|| MountError::Api("add returned no job id".to_string()))
}

fn parse_job_status(raw: &str) -> JobStatus {
    match raw.to_lowercase().as_str() {
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "downloading" | "extracting" | "verifying" | "repairing" => JobStatus::Downloading,
        _ => JobStatus::Queued,
    }
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    status: bool,
    #[serde(default)]
    nzo_ids: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    history: HistorySlots,
}

#[derive(Debug, Deserialize)]
struct HistorySlots {
    #[serde(default)]
    slots: Vec<HistorySlot>,
}

#[derive(Debug, Deserialize)]
struct HistorySlot {
    nzo_id: String,
    name: String,
    status: String,
    #[serde(default)]
    fail_message: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    storage: Option<String>,
}
