use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::http::{build_url, HttpClient, RedirectPolicy};
use crate::lyrics::{LyricsProvider, LyricsSource, TrackMetadata};
use crate::utils::filter_netease_lyrics;

pub const DEFAULT_BASE_URL: &str = "https://music.xianqiao.wang/neteaseapiv2";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:93.0) Gecko/20100101 Firefox/93.0";

/// 网易云音乐歌词提供者
pub struct NeteaseProvider {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl NeteaseProvider {
    /// 创建新的网易云音乐歌词提供者
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

    /// 搜索歌曲，返回匹配歌曲的 ID
    async fn search(&self, metadata: &TrackMetadata) -> Result<Option<String>, ProviderError> {
        let keyword = format!("{} {}", metadata.track(), metadata.artist());
        let url = build_url(
            &format!("{}/search", self.base_url),
            &[("limit", "10"), ("type", "1"), ("keywords", keyword.trim())],
        )?;

        debug!("网易云音乐搜索 URL: {}", url);

        let resp = self
            .http
            .get(&url, &[("User-Agent", USER_AGENT)], RedirectPolicy::Follow)
            .await?;

        if !resp.is_success() {
            warn!("网易云音乐搜索请求失败: HTTP {}", resp.status);
            return Err(ProviderError::Status(resp.status));
        }

        let json: Value = resp.json()?;
        let songs = json
            .pointer("/result/songs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if songs.is_empty() {
            info!("网易云音乐未找到歌曲");
            return Ok(None);
        }

        debug!("网易云音乐搜索结果数量: {}", songs.len());

        let song = songs.iter().find(|song| {
            let name_matches = song["name"]
                .as_str()
                .is_some_and(|name| metadata.track_matches(name));
            let artist_matches = song["artists"].as_array().is_some_and(|artists| {
                artists.iter().any(|artist| {
                    artist["name"]
                        .as_str()
                        .is_some_and(|name| metadata.artist_matches(name))
                })
            });
            name_matches && artist_matches
        });

        let Some(song) = song else {
            info!("网易云音乐没有歌名和艺术家都匹配的歌曲");
            return Ok(None);
        };

        let song_id = match &song["id"] {
            Value::Number(id) => Some(id.to_string()),
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            _ => None,
        };

        debug!("网易云音乐匹配歌曲 ID: {:?}", song_id);
        Ok(song_id)
    }

    /// 获取歌词并过滤制作人员信息
    async fn fetch(&self, song_id: &str) -> Result<Option<String>, ProviderError> {
        let url = build_url(&format!("{}/lyric", self.base_url), &[("id", song_id)])?;

        debug!("获取网易云音乐歌词, URL: {}", url);

        let resp = self
            .http
            .get(&url, &[("User-Agent", USER_AGENT)], RedirectPolicy::Follow)
            .await?;

        if !resp.is_success() {
            warn!("网易云音乐歌词请求失败: HTTP {}", resp.status);
            return Err(ProviderError::Status(resp.status));
        }

        let json: Value = resp.json()?;
        let Some(lyric) = json
            .pointer("/lrc/lyric")
            .and_then(Value::as_str)
            .filter(|lyric| !lyric.is_empty())
        else {
            info!("网易云音乐没有这首歌的歌词");
            return Ok(None);
        };

        let filtered = filter_netease_lyrics(lyric);
        if filtered.is_empty() {
            debug!("网易云音乐歌词过滤后为空");
            return Ok(None);
        }

        Ok(Some(filtered))
    }
}

#[async_trait]
impl LyricsProvider for NeteaseProvider {
    fn source(&self) -> LyricsSource {
        LyricsSource::Netease
    }

    async fn resolve(&self, metadata: &TrackMetadata) -> Result<Option<String>, ProviderError> {
        let Some(song_id) = self.search(metadata).await? else {
            info!("缺少网易云音乐歌曲 ID");
            return Ok(None);
        };

        let lyrics = self.fetch(&song_id).await?;
        if lyrics.is_some() {
            info!(
                "成功获取网易云音乐歌词: {} - {}",
                metadata.track(),
                metadata.artist()
            );
        }
        Ok(lyrics)
    }
}
