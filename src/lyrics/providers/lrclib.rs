//! LRCLIB 歌词源
//!
//! LRCLIB 是免费的歌词 API，搜索接口直接返回 LRC 格式的同步歌词。
//! API 文档: https://lrclib.net/docs

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::http::{build_url, HttpClient, RedirectPolicy};
use crate::lyrics::{LyricsProvider, LyricsSource, TrackMetadata};

pub const DEFAULT_BASE_URL: &str = "https://lrclib.net/api";
const CLIENT_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// LRCLIB 搜索结果
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LrclibTrack {
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub album_name: Option<String>,
    #[serde(default)]
    pub synced_lyrics: Option<String>,
}

/// LRCLIB 歌词提供者
pub struct LrclibProvider {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl LrclibProvider {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 搜索，一次请求即可拿到歌词
    async fn search(&self, metadata: &TrackMetadata) -> Result<Vec<LrclibTrack>, ProviderError> {
        let mut params = Vec::new();
        if let Some(track) = metadata.track.as_deref() {
            params.push(("track_name", track));
        }
        if let Some(artist) = metadata.artist.as_deref() {
            params.push(("artist_name", artist));
        }
        if let Some(album) = metadata.album.as_deref() {
            params.push(("album_name", album));
        }
        params.push(("q", metadata.track()));

        let url = build_url(&format!("{}/search", self.base_url), &params)?;

        debug!("LRCLIB 搜索 URL: {}", url);

        let resp = self
            .http
            .get(
                &url,
                &[("Lrclib-Client", CLIENT_NAME), ("User-Agent", CLIENT_NAME)],
                RedirectPolicy::Follow,
            )
            .await?;

        if !resp.is_success() {
            warn!("LRCLIB 请求失败: HTTP {}", resp.status);
            return Err(ProviderError::Status(resp.status));
        }

        Ok(resp.json()?)
    }
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn source(&self) -> LyricsSource {
        LyricsSource::Lrclib
    }

    async fn resolve(&self, metadata: &TrackMetadata) -> Result<Option<String>, ProviderError> {
        info!(
            "从 LRCLIB 获取歌词: {} - {} ({})",
            metadata.track(),
            metadata.artist(),
            metadata.album()
        );

        let results = self.search(metadata).await?;
        debug!("LRCLIB 搜索结果数量: {}", results.len());

        let matched = results.into_iter().find(|candidate| {
            candidate
                .artist_name
                .as_deref()
                .is_some_and(|name| metadata.artist_matches(name))
                && candidate
                    .track_name
                    .as_deref()
                    .is_some_and(|name| metadata.track_matches(name))
        });

        match matched.and_then(|track| track.synced_lyrics).filter(|l| !l.is_empty()) {
            Some(lyrics) => {
                info!("成功获取 LRCLIB 同步歌词");
                Ok(Some(lyrics))
            }
            None => {
                info!("LRCLIB 没有这首歌的同步歌词");
                Ok(None)
            }
        }
    }
}
