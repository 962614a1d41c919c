//! Server-side render jobs: a provider answers "not ready yet" with a status URL and
//! the URL the finished file will live at, and the client polls until done.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ResolverResult;

/// State of a render job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Job descriptor carried by a 202 response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
}

impl JobDescriptor {
    /// Builds the job, resolving relative URLs against `base`.
    ///
    /// `None` when either URL is missing or blank.
    pub fn into_job(self, base: &Url) -> ResolverResult<Option<RenderJob>> {
        let (Some(status_url), Some(file_url)) = (
            self.status_url.filter(|s| !s.trim().is_empty()),
            self.file_url.filter(|s| !s.trim().is_empty()),
        ) else {
            return Ok(None);
        };

        Ok(Some(RenderJob::new(base.join(&status_url)?, base.join(&file_url)?)))
    }
}

/// Body of a status poll.
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    download: Option<DownloadState>,
}

#[derive(Debug, Deserialize)]
struct DownloadState {
    #[serde(default)]
    status: Option<RemoteStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RemoteStatus {
    Completed,
    Failed,
    #[serde(other)]
    InProgress,
}

impl From<StatusEnvelope> for JobStatus {
    fn from(envelope: StatusEnvelope) -> Self {
        match envelope.download.and_then(|d| d.status) {
            Some(RemoteStatus::Completed) => JobStatus::Completed,
            Some(RemoteStatus::Failed) => JobStatus::Failed,
            Some(RemoteStatus::InProgress) | None => JobStatus::Pending,
        }
    }
}

/// An asynchronous unit of work owned by the call that created it.
#[derive(Debug)]
pub struct RenderJob {
    status_url: Url,
    file_url: Url,
    created_at: Instant,
}

impl RenderJob {
    pub fn new(status_url: Url, file_url: Url) -> Self {
        Self {
            status_url,
            file_url,
            created_at: Instant::now(),
        }
    }

    pub fn status_url(&self) -> &Url {
        &self.status_url
    }

    pub fn file_url(&self) -> &Url {
        &self.file_url
    }

    /// Polls until the job reaches a terminal state or `timeout` elapses.
    ///
    /// Returns the file URL once completed, `None` on failure or timeout. A poll
    /// answered with a non-200 status is skipped. Transport and decoding errors
    /// end the wait with an error. Dropping the future stops polling.
    pub async fn wait(
        self,
        client: &Client,
        timeout: Duration,
        interval: Duration,
    ) -> ResolverResult<Option<Url>> {
        let deadline = Instant::now() + timeout;
        debug!("Polling render job {} for up to {:?}", self.status_url, timeout);

        while Instant::now() < deadline {
            // A single slow poll must not push us past the deadline
            match timeout_at(deadline, self.poll(client)).await {
                Err(_) => break,
                Ok(result) => match result? {
                    Some(JobStatus::Completed) => {
                        info!(
                            "Render job completed after {:?}: {}",
                            self.created_at.elapsed(),
                            self.file_url
                        );
                        return Ok(Some(self.file_url));
                    }
                    Some(JobStatus::Failed) => {
                        warn!("Render job failed: {}", self.status_url);
                        return Ok(None);
                    }
                    Some(JobStatus::Pending) | None => {}
                },
            }

            sleep_until((Instant::now() + interval).min(deadline)).await;
        }

        warn!(
            "Render job not ready after {:?}: {}",
            self.created_at.elapsed(),
            self.status_url
        );
        Ok(None)
    }

    /// One status request. `None` when the server answered with a non-200 status.
    async fn poll(&self, client: &Client) -> ResolverResult<Option<JobStatus>> {
        let response = client.get(self.status_url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            debug!("Status poll returned {}, retrying", response.status());
            return Ok(None);
        }

        let envelope: StatusEnvelope = response.json().await?;
        Ok(Some(envelope.into()))
    }
}
