mod manager;
pub mod providers;
pub mod token;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use crate::error::ProviderError;
use crate::utils::{parse_lyrics, LyricEvent};

pub use manager::LyricsManager;

/// 歌曲信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// 歌曲标题
    pub track: Option<String>,
    /// 艺术家
    pub artist: Option<String>,
    /// 专辑
    pub album: Option<String>,
    /// 歌曲时长（毫秒）
    pub duration_ms: Option<u64>,
}

impl TrackMetadata {
    pub fn new(track: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            track: Some(track.into()),
            artist: Some(artist.into()),
            ..Default::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// 至少包含歌曲名、艺术家、专辑中的一项
    pub fn is_valid(&self) -> bool {
        [&self.track, &self.artist, &self.album]
            .iter()
            .any(|field| field.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn track(&self) -> &str {
        self.track.as_deref().unwrap_or_default()
    }

    pub fn artist(&self) -> &str {
        self.artist.as_deref().unwrap_or_default()
    }

    pub fn album(&self) -> &str {
        self.album.as_deref().unwrap_or_default()
    }

    /// 由 (track, artist, album) 计算歌曲标识
    ///
    /// 每个字段单独做 base64 后用 `.` 连接，`.` 不在 base64 字母表中，字段边界不会混淆。
    pub fn identity(&self) -> TrackIdentity {
        let key = [self.track(), self.artist(), self.album()]
            .iter()
            .map(|field| general_purpose::STANDARD.encode(field))
            .collect::<Vec<_>>()
            .join(".");
        TrackIdentity(key)
    }

    /// 歌曲名完全一致（不区分大小写）
    pub(crate) fn track_matches(&self, candidate: &str) -> bool {
        candidate.to_lowercase() == self.track().to_lowercase()
    }

    /// 候选艺术家包含查询艺术家（不区分大小写），兼容多艺术家署名
    pub(crate) fn artist_matches(&self, candidate: &str) -> bool {
        candidate.to_lowercase().contains(&self.artist().to_lowercase())
    }
}

/// 歌曲标识，用作缓存键和防重入键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TrackIdentity(String);

impl TrackIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 歌词源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LyricsSource {
    Musixmatch,
    Lrclib,
    Netease,
}

impl LyricsSource {
    pub const DEFAULT_ORDER: [LyricsSource; 3] = [
        LyricsSource::Musixmatch,
        LyricsSource::Lrclib,
        LyricsSource::Netease,
    ];

    /// 配置文件中使用的名称
    pub fn key(self) -> &'static str {
        match self {
            LyricsSource::Musixmatch => "musixmatch",
            LyricsSource::Lrclib => "lrclib",
            LyricsSource::Netease => "netease",
        }
    }

    /// 展示给用户的名称
    pub fn display_name(self) -> &'static str {
        match self {
            LyricsSource::Musixmatch => "Musixmatch",
            LyricsSource::Lrclib => "lrclib.net",
            LyricsSource::Netease => "Netease",
        }
    }
}

impl FromStr for LyricsSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "musixmatch" => Ok(LyricsSource::Musixmatch),
            "lrclib" => Ok(LyricsSource::Lrclib),
            "netease" => Ok(LyricsSource::Netease),
            other => Err(format!("未知的歌词源: {other}")),
        }
    }
}

impl fmt::Display for LyricsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 歌词提供者接口
///
/// 实现只读取歌曲信息并返回原始歌词，不修改任何共享状态。
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// 歌词源
    fn source(&self) -> LyricsSource;

    /// 搜索并获取原始歌词，`Ok(None)` 表示该源没有这首歌的同步歌词
    async fn resolve(&self, metadata: &TrackMetadata) -> Result<Option<String>, ProviderError>;
}

/// `get_lyrics` 的结果
#[derive(Debug, Clone, Serialize)]
pub struct LyricsResult {
    pub identity: TrackIdentity,
    /// 原始歌词，`None` 表示所有歌词源都没有结果
    pub raw_lyrics: Option<String>,
    pub track: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub source: Option<LyricsSource>,
    /// 是否来自缓存
    pub cached: bool,
    #[serde(skip)]
    instrumental_indicator: String,
}

impl LyricsResult {
    /// 解析原始歌词
    pub fn parse(&self) -> Option<Vec<LyricEvent>> {
        parse_lyrics(self.raw_lyrics.as_deref(), &self.instrumental_indicator)
    }
}
