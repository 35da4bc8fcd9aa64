use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use log::debug;
use reqwest::Url;

use crate::error::{Result, SpeakerError};

pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Asynchronous GET used for URL tracks.
pub trait Fetcher: Send + Sync {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchResponse>>;
}

#[derive(Default, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> HttpFetcher {
        HttpFetcher { client }
    }
}

impl Fetcher for HttpFetcher {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchResponse>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok(FetchResponse { status, body })
        })
    }
}

/// Where a track's bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSource {
    Url(Url),
    File(PathBuf),
}

impl TrackSource {
    /// Only http(s) URLs count as remote, and only when URLs are allowed.
    pub fn parse(track: &str, allow_url: bool) -> TrackSource {
        if allow_url {
            if let Ok(url) = Url::parse(track) {
                if matches!(url.scheme(), "http" | "https") {
                    return TrackSource::Url(url);
                }
            }
        }
        TrackSource::File(PathBuf::from(track))
    }

    pub fn extension(&self) -> Option<String> {
        let path = match self {
            TrackSource::Url(url) => Path::new(url.path()),
            TrackSource::File(path) => path.as_path(),
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

pub struct ResolvedTrack {
    pub bytes: Vec<u8>,
    pub extension: Option<String>,
}

/// Loads the bytes behind `track`.
pub async fn resolve(
    track: &str,
    allow_url: bool,
    allowed_extensions: &[String],
    fetcher: &dyn Fetcher,
) -> Result<ResolvedTrack> {
    let source = TrackSource::parse(track, allow_url);
    let extension = source.extension();

    let bytes = match &source {
        TrackSource::Url(url) => {
            debug!("fetching {}", url);
            let response = fetcher.get(url.as_str()).await?;
            if response.status != 200 {
                return Err(SpeakerError::SourceUnavailable(format!(
                    "failed to retrieve {}: {} {}",
                    track,
                    response.status,
                    String::from_utf8_lossy(&response.body)
                )));
            }
            response.body
        }
        TrackSource::File(path) => {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(SpeakerError::SourceUnavailable(format!(
                    "audio file {} does not exist",
                    track
                )));
            }
            let supported = extension
                .as_ref()
                .map(|ext| allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if !supported {
                return Err(SpeakerError::SourceUnavailable(format!(
                    "audio file {} is not valid, audio files must be one of {:?}",
                    track, allowed_extensions
                )));
            }
            tokio::fs::read(path).await?
        }
    };

    Ok(ResolvedTrack { bytes, extension })
}
