use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::http::{build_url, HttpClient, HttpResponse, RedirectPolicy};
use crate::lyrics::token::{is_captcha, TokenData, TokenManager, APP_ID, DEFAULT_BASE_URL};
use crate::lyrics::{LyricsProvider, LyricsSource, TrackMetadata};

/// Musixmatch 歌词提供者
pub struct MusixmatchProvider {
    http: Arc<dyn HttpClient>,
    token_manager: Arc<TokenManager>,
    base_url: String,
}

impl MusixmatchProvider {
    pub fn new(http: Arc<dyn HttpClient>, token_manager: Arc<TokenManager>) -> Self {
        Self {
            http,
            token_manager,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 带上令牌 Cookie 发送请求，并检查状态码和 captcha
    async fn request(
        &self,
        url: &str,
        token: &TokenData,
        stage: &str,
    ) -> Result<Value, ProviderError> {
        debug!("Musixmatch {} URL: {}", stage, url);

        let mut headers = Vec::new();
        if let Some(cookies) = token.cookies.as_deref() {
            headers.push(("cookie", cookies));
        }

        let resp: HttpResponse = self.http.get(url, &headers, RedirectPolicy::Follow).await?;

        if !resp.is_success() {
            warn!("Musixmatch {} 请求失败: HTTP {}", stage, resp.status);
            return Err(ProviderError::Status(resp.status));
        }

        let body: Value = resp.json()?;

        if is_captcha(&body) {
            warn!("Musixmatch 用户令牌因请求过多被临时封禁 (captcha) [{}]", stage);
            return Err(ProviderError::Captcha);
        }

        Ok(body)
    }

    /// 搜索歌曲，返回 commontrack_id
    async fn search(
        &self,
        metadata: &TrackMetadata,
        token: &TokenData,
    ) -> Result<Option<String>, ProviderError> {
        let duration_secs = metadata
            .duration_ms
            .filter(|ms| *ms > 0)
            .map(|ms| ms as f64 / 1000.0);
        let q_duration = duration_secs.map(|d| d.to_string()).unwrap_or_default();
        let subtitle_length = duration_secs
            .map(|d| (d.floor() as u64).to_string())
            .unwrap_or_default();

        let url = build_url(
            &format!("{}/track.search", self.base_url),
            &[
                ("app_id", APP_ID),
                ("usertoken", token.user_token.as_str()),
                ("q_track", metadata.track()),
                ("q_artist", metadata.artist()),
                ("q_album", metadata.album()),
                ("page_size", "20"),
                ("page", "1"),
                ("f_has_subtitle", "1"),
                ("q_duration", q_duration.as_str()),
                ("f_subtitle_length", subtitle_length.as_str()),
            ],
        )?;

        let body = self.request(&url, token, "搜索").await?;

        let track_list = body
            .pointer("/message/body/track_list")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if track_list.is_empty() {
            info!("Musixmatch 未找到歌曲");
            return Ok(None);
        }

        debug!("Musixmatch 搜索结果数量: {}", track_list.len());

        let matched = track_list.iter().map(|item| &item["track"]).find(|track| {
            track["track_name"]
                .as_str()
                .is_some_and(|name| metadata.track_matches(name))
                && track["artist_name"]
                    .as_str()
                    .is_some_and(|name| metadata.artist_matches(name))
        });

        let Some(track) = matched else {
            info!("Musixmatch 没有歌名和艺术家都匹配的歌曲");
            return Ok(None);
        };

        let commontrack_id = match &track["commontrack_id"] {
            Value::Number(id) => Some(id.to_string()),
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            _ => None,
        };

        debug!("Musixmatch commontrack_id: {:?}", commontrack_id);
        Ok(commontrack_id)
    }

    /// 获取同步歌词，captcha 只视为没有结果，不重新获取令牌
    async fn fetch(
        &self,
        commontrack_id: &str,
        token: &TokenData,
    ) -> Result<Option<String>, ProviderError> {
        let url = build_url(
            &format!("{}/track.subtitle.get", self.base_url),
            &[
                ("app_id", APP_ID),
                ("usertoken", token.user_token.as_str()),
                ("commontrack_id", commontrack_id),
            ],
        )?;

        let body = self.request(&url, token, "歌词").await?;

        let lyrics = body
            .pointer("/message/body/subtitle/subtitle_body")
            .and_then(Value::as_str)
            .filter(|lyrics| !lyrics.is_empty())
            .map(str::to_string);

        if lyrics.is_none() {
            info!("Musixmatch 缺少歌词");
        }

        Ok(lyrics)
    }
}

#[async_trait]
impl LyricsProvider for MusixmatchProvider {
    fn source(&self) -> LyricsSource {
        LyricsSource::Musixmatch
    }

    async fn resolve(&self, metadata: &TrackMetadata) -> Result<Option<String>, ProviderError> {
        let token = self.token_manager.acquire().await?;

        info!(
            "从 Musixmatch 获取歌词: {} - {} ({})",
            metadata.track(),
            metadata.artist(),
            metadata.album()
        );

        let Some(commontrack_id) = self.search(metadata, &token).await? else {
            info!("缺少 Musixmatch commontrack_id");
            return Ok(None);
        };

        let lyrics = self.fetch(&commontrack_id, &token).await?;
        if lyrics.is_some() {
            info!("成功获取 Musixmatch 同步歌词");
        }
        Ok(lyrics)
    }
}
