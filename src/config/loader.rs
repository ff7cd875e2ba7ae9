use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SyncLyricsError};
use crate::logging::LogLevel;
use crate::lyrics::token::RetryPolicy;
use crate::lyrics::LyricsSource;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 日志级别: none / info / warn / error / debug
    pub log_level: LogLevel,

    /// 间奏标记文本，为空时不插入间奏标记
    pub instrumental_lyrics_indicator: String,

    /// 按优先级排列的歌词源: musixmatch / lrclib / netease
    pub sources: Vec<String>,

    /// 缓存的歌曲数量，默认只保留当前歌曲
    pub cache_capacity: usize,

    /// 歌词源接口地址
    pub endpoints: EndpointsConfig,

    /// Musixmatch 相关设置
    pub musixmatch: MusixmatchConfig,
}

/// 歌词源接口地址，未设置时使用官方地址，可指向镜像
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointsConfig {
    /// 例如 https://apic-desktop.musixmatch.com/ws/1.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub musixmatch: Option<String>,

    /// 例如 https://lrclib.net/api
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lrclib: Option<String>,

    /// 例如 https://music.xianqiao.wang/neteaseapiv2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netease: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MusixmatchConfig {
    /// 令牌接口允许的最大重定向次数
    pub max_redirects: u32,

    /// 令牌保存路径，未设置时使用配置目录下的 musixmatch-token.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,

    /// 令牌接口触发验证码时的重试策略
    pub token_retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LogLevel::None,
            instrumental_lyrics_indicator: String::new(),
            sources: LyricsSource::DEFAULT_ORDER
                .iter()
                .map(|source| source.key().to_string())
                .collect(),
            cache_capacity: 1,
            endpoints: EndpointsConfig::default(),
            musixmatch: MusixmatchConfig::default(),
        }
    }
}

impl Default for MusixmatchConfig {
    fn default() -> Self {
        MusixmatchConfig {
            max_redirects: 3,
            token_path: None,
            token_retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// 默认配置目录: ~/.config/<pkg_name>
    pub fn config_dir() -> PathBuf {
        let pkg_name = env!("CARGO_PKG_NAME");
        dirs::config_dir()
            .map(|p| p.join(pkg_name))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// 令牌文件路径
    pub fn token_path(&self) -> PathBuf {
        self.musixmatch
            .token_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("musixmatch-token.json"))
    }

    /// 加载配置，支持从指定路径或默认路径加载
    ///
    /// 文件不存在时写入默认配置；文件存在但无法解析时返回 [`SyncLyricsError::Config`]。
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Self::config_dir().join("config.toml"));

        debug!("尝试从 {:?} 加载配置文件", config_path);

        if !config_path.exists() {
            debug!("配置文件 {:?} 不存在，将创建默认配置", config_path);
            let default_config = Config::default();
            let toml = toml::to_string_pretty(&default_config)
                .map_err(|e| SyncLyricsError::Config(e.to_string()))?;

            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
                debug!("已确保目录 {:?} 存在", parent);
            }

            fs::write(&config_path, toml)?;
            info!("已创建默认配置文件: {:?}", config_path);
            return Ok(default_config);
        }

        // 此时日志尚未初始化，解析错误直接返回给调用方
        let content = fs::read_to_string(&config_path)?;
        let config = Self::from_toml(&content).map_err(|e| {
            SyncLyricsError::Config(format!("解析配置文件 {:?} 失败: {}", config_path, e))
        })?;

        debug!("已成功加载配置文件");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncLyricsError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sources, vec!["musixmatch", "lrclib", "netease"]);
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.log_level, LogLevel::None);
        assert!(config.instrumental_lyrics_indicator.is_empty());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
log_level = "warn"
instrumental_lyrics_indicator = "♪"
sources = ["netease", "lrclib"]

[endpoints]
lrclib = "http://mirror.test/api"

[musixmatch.token_retry]
max_retries = 1
"#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.instrumental_lyrics_indicator, "♪");
        assert_eq!(config.sources, vec!["netease", "lrclib"]);
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.musixmatch.token_retry.max_retries, 1);
        assert_eq!(config.musixmatch.token_retry.base_delay(), Duration::from_secs(10));
        assert_eq!(config.musixmatch.max_redirects, 3);
        assert_eq!(config.endpoints.lrclib.as_deref(), Some("http://mirror.test/api"));
        assert_eq!(config.endpoints.musixmatch, None);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("log_level = \"loud\"").unwrap_err();
        assert!(matches!(err, SyncLyricsError::Config(_)));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(path.clone())).unwrap();
        assert!(path.exists());
        assert_eq!(config.sources.len(), 3);

        let reloaded = Config::load(Some(path)).unwrap();
        assert_eq!(reloaded.sources, config.sources);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "sources = [\"lrclib\"\ncache_capacity = ").unwrap();

        let err = Config::load(Some(path)).unwrap_err();
        assert!(matches!(err, SyncLyricsError::Config(_)));
    }
}
