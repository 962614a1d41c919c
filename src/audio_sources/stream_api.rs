//! Job-based stream provider.
//!
//! A single GET against `/api/downloads/stream` either answers with the audio itself
//! (the redirected URL is then the stream URL) or with `202 Accepted` and a render
//! job to poll.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, error, info};
use url::Url;

use super::render_job::JobDescriptor;
use super::{ProviderResult, ResolveOptions, StreamProvider, as_base_url};
use crate::HTTP_CLIENT;
use crate::error::ResolverResult;

/// Resolve endpoint, relative to the provider's base URL.
const STREAM_ENDPOINT: &str = "api/downloads/stream";

/// Client for one job-based streaming API.
pub struct StreamApi {
    client: Client,
    base_url: Url,
}

impl StreamApi {
    /// Uses the shared HTTP client.
    pub fn new(base_url: Url) -> Self {
        Self::with_client(HTTP_CLIENT.clone(), base_url)
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url: as_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the response carries audio bytes.
    fn is_audio(response: &Response) -> bool {
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().to_ascii_lowercase().starts_with("audio"))
    }

    async fn try_resolve(&self, query: &str, options: &ResolveOptions) -> ResolverResult<ProviderResult> {
        let endpoint = self.base_url.join(STREAM_ENDPOINT)?;

        // Redirects are followed by the client, so `response.url()` is the final location
        let response = self
            .client
            .get(endpoint)
            .query(&[
                ("query", query),
                ("format", options.format.as_str()),
                ("quality", options.quality.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK && Self::is_audio(&response) {
            info!("Stream ready immediately for: {}", query);
            return Ok(ProviderResult::found(response.url().clone(), query));
        }

        if status != StatusCode::ACCEPTED {
            debug!("Stream API answered {} for: {}", status, query);
            return Ok(ProviderResult::empty());
        }

        let descriptor: JobDescriptor = response.json().await?;
        let Some(job) = descriptor.into_job(&self.base_url)? else {
            debug!("Stream API accepted {} without a usable job descriptor", query);
            return Ok(ProviderResult::empty());
        };

        info!("Waiting on render job for: {}", query);
        let ready = job
            .wait(&self.client, options.timeout, options.poll_interval)
            .await?;

        Ok(match ready {
            Some(file_url) => ProviderResult::found(file_url, query),
            None => ProviderResult::empty(),
        })
    }
}

#[async_trait]
impl StreamProvider for StreamApi {
    fn name(&self) -> &str {
        "stream-api"
    }

    async fn resolve(&self, query: &str, options: &ResolveOptions) -> ProviderResult {
        match self.try_resolve(query, options).await {
            Ok(result) => result,
            Err(e) => {
                error!("Stream API error for '{}': {}", query, e);
                ProviderResult::empty()
            }
        }
    }
}
