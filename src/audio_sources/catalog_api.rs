//! Two-step catalog provider: search songs by text, fetch the best hit's details,
//! and pick a download URL from its candidate list.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ProviderResult, ResolveOptions, StreamProvider, as_base_url};
use crate::HTTP_CLIENT;
use crate::error::{ResolverError, ResolverResult};

const SEARCH_ENDPOINT: &str = "api/search/songs";
const SONG_ENDPOINT: &str = "api/songs/";

/// File extensions recognised as directly playable audio.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "flac", "wav"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SongResponse {
    #[serde(default)]
    data: Vec<SongDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongDetails {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    download_url: Vec<DownloadCandidate>,
}

/// One encoding offered for a song, in the order the API lists them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DownloadCandidate {
    #[serde(default)]
    pub quality: Option<String>,
    pub url: String,
}

impl DownloadCandidate {
    fn has_audio_extension(&self) -> bool {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|segments| segments.last().map(str::to_string))
            })
            .and_then(|file| file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
    }
}

/// Picks the best candidate.
///
/// Later entries are higher quality. The last entry with a recognised audio extension
/// wins; without any, the last entry overall.
pub fn best_candidate(candidates: &[DownloadCandidate]) -> Option<&DownloadCandidate> {
    candidates
        .iter()
        .rev()
        .find(|c| c.has_audio_extension())
        .or_else(|| candidates.last())
}

/// Client for a search + details catalog API.
pub struct CatalogApi {
    client: Client,
    base_url: Url,
}

impl CatalogApi {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(HTTP_CLIENT.clone(), base_url)
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url: as_base_url(base_url),
        }
    }

    async fn search(&self, query: &str) -> ResolverResult<Option<SearchHit>> {
        let response = self
            .client
            .get(self.base_url.join(SEARCH_ENDPOINT)?)
            .query(&[("query", query), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Catalog search answered {} for: {}", response.status(), query);
            return Ok(None);
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.data.and_then(|d| d.results.into_iter().next()))
    }

    async fn details(&self, id: &str) -> ResolverResult<Option<SongDetails>> {
        let endpoint = self.base_url.join(SONG_ENDPOINT)?.join(id)?;
        let response = self.client.get(endpoint).send().await?;

        if !response.status().is_success() {
            debug!("Catalog details answered {} for id {}", response.status(), id);
            return Ok(None);
        }

        let body: SongResponse = response.json().await?;
        Ok(body.data.into_iter().next())
    }

    async fn try_resolve(&self, query: &str) -> ResolverResult<ProviderResult> {
        let Some(hit) = self.search(query).await? else {
            debug!("Catalog has no match for: {}", query);
            return Ok(ProviderResult::empty());
        };
        debug!("Catalog matched '{}' to {} ({:?})", query, hit.id, hit.name);

        let Some(song) = self.details(&hit.id).await? else {
            return Ok(ProviderResult::empty());
        };

        let Some(candidate) = best_candidate(&song.download_url) else {
            warn!("Catalog entry {} lists no download URLs", hit.id);
            return Ok(ProviderResult::empty());
        };

        let url = Url::parse(&candidate.url)?;
        let resolved = song.name.or(hit.name).unwrap_or_else(|| query.to_string());
        info!("Catalog resolved '{}' at {:?}", resolved, candidate.quality);
        Ok(ProviderResult::found(url, resolved))
    }
}

#[async_trait]
impl StreamProvider for CatalogApi {
    fn name(&self) -> &str {
        "catalog-api"
    }

    async fn resolve(&self, query: &str, options: &ResolveOptions) -> ProviderResult {
        let result = tokio::time::timeout(options.timeout, self.try_resolve(query))
            .await
            .map_err(|_| {
                ResolverError::ExternalApiError(format!("no answer within {:?}", options.timeout))
            })
            .and_then(|result| result);

        match result {
            Ok(result) => result,
            Err(e) => {
                error!("Catalog API error for '{}': {}", query, e);
                ProviderResult::empty()
            }
        }
    }
}
