use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, SyncLyricsError};
use crate::http::{HttpClient, ReqwestClient};
use crate::lyrics::providers::{default_providers, resolve_source_order};
use crate::lyrics::token::{FileTokenStore, Sleeper, TokenStore};
use crate::lyrics::{LyricsProvider, LyricsResult, LyricsSource, TrackIdentity, TrackMetadata};
use crate::utils::{parse_lyrics, LyricEvent};

/// 缓存项，`raw_lyrics` 为 `None` 表示已确认没有歌词
#[derive(Debug, Clone)]
struct CacheEntry {
    raw_lyrics: Option<String>,
    source: Option<LyricsSource>,
}

/// 正在获取中的歌曲及其当前查询的歌词源
type InFlight = Mutex<HashMap<TrackIdentity, Option<LyricsSource>>>;

/// 获取期间持有，离开作用域（包括 future 被取消）时清除标记
struct FetchGuard<'a> {
    in_flight: &'a InFlight,
    identity: TrackIdentity,
}

impl FetchGuard<'_> {
    fn set_provider(&self, source: LyricsSource) {
        self.in_flight
            .lock()
            .unwrap()
            .insert(self.identity.clone(), Some(source));
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.identity);
    }
}

/// [`LyricsManager`] 构建器
pub struct LyricsManagerBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    token_store: Option<Arc<dyn TokenStore>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    overrides: HashMap<LyricsSource, Arc<dyn LyricsProvider>>,
}

impl LyricsManagerBuilder {
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// 替换令牌接口 captcha 退避时的等待实现
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// 用自定义实现替换某个歌词源
    pub fn provider(mut self, provider: Arc<dyn LyricsProvider>) -> Self {
        self.overrides.insert(provider.source(), provider);
        self
    }

    pub fn build(self) -> Result<LyricsManager> {
        if self.config.sources.is_empty() {
            return Err(SyncLyricsError::NoSources);
        }

        let order = resolve_source_order(&self.config.sources);

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestClient::new()?),
        };
        let token_store: Arc<dyn TokenStore> = match self.token_store {
            Some(store) => store,
            None => Arc::new(FileTokenStore::new(self.config.token_path())),
        };

        let mut providers = default_providers(&self.config, http, token_store, self.sleeper);
        providers.extend(self.overrides);

        let capacity = NonZeroUsize::new(self.config.cache_capacity).unwrap_or(NonZeroUsize::MIN);

        info!(
            "歌词源顺序: {}",
            order.iter().map(|s| s.key()).collect::<Vec<_>>().join(" -> ")
        );

        Ok(LyricsManager {
            config: self.config,
            order,
            providers,
            cache: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            last_lyrics: Mutex::new(None),
        })
    }
}

/// 歌词管理器
///
/// 按配置顺序依次查询歌词源，第一个返回非空歌词的源胜出；结果按歌曲标识缓存，
/// 包括“所有源都没有歌词”的否定结果。同一首歌同时只允许一次获取。
pub struct LyricsManager {
    config: Config,
    order: Vec<LyricsSource>,
    providers: HashMap<LyricsSource, Arc<dyn LyricsProvider>>,
    cache: Mutex<LruCache<TrackIdentity, CacheEntry>>,
    in_flight: InFlight,
    last_lyrics: Mutex<Option<String>>,
}

impl LyricsManager {
    pub fn builder(config: Config) -> LyricsManagerBuilder {
        LyricsManagerBuilder {
            config,
            http: None,
            token_store: None,
            sleeper: None,
            overrides: HashMap::new(),
        }
    }

    /// 使用默认 HTTP 客户端创建
    pub fn new(config: Config, token_store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::builder(config).token_store(token_store).build()
    }

    /// 实际使用的歌词源顺序
    pub fn source_order(&self) -> &[LyricsSource] {
        &self.order
    }

    /// 获取歌词
    ///
    /// - 缓存未命中: 依次查询歌词源，返回 `Some`，`raw_lyrics` 可能为 `None`
    /// - 缓存命中且有歌词: 返回 `Some`，`cached` 为 `true`
    /// - 缓存命中但确认没有歌词: 返回 `None`
    /// - 同一首歌正在获取中: 返回 `None`，不写缓存
    pub async fn get_lyrics(&self, metadata: &TrackMetadata) -> Result<Option<LyricsResult>> {
        if !metadata.is_valid() {
            return Err(SyncLyricsError::InvalidMetadata);
        }

        let identity = metadata.identity();
        debug!(
            "获取歌词: {} - {} ({}), 标识: {}",
            metadata.track(),
            metadata.artist(),
            metadata.album(),
            identity
        );

        let cached = self.cache.lock().unwrap().get(&identity).cloned();
        if let Some(entry) = cached {
            *self.last_lyrics.lock().unwrap() = entry.raw_lyrics.clone();

            let Some(raw_lyrics) = entry.raw_lyrics else {
                debug!("缓存中记录该歌曲没有歌词");
                return Ok(None);
            };

            debug!("使用缓存的歌词");
            return Ok(Some(self.result(metadata, identity, Some(raw_lyrics), entry.source, true)));
        }

        let Some(guard) = self.begin_fetch(&identity) else {
            return Ok(None);
        };

        let (raw_lyrics, source) = self.fetch_from_providers(metadata, &guard).await;

        // 先写缓存再释放标记，后到的同一请求会直接命中缓存
        self.cache.lock().unwrap().put(
            identity.clone(),
            CacheEntry {
                raw_lyrics: raw_lyrics.clone(),
                source,
            },
        );
        *self.last_lyrics.lock().unwrap() = raw_lyrics.clone();
        drop(guard);

        match source {
            Some(source) => info!(
                "成功获取歌词: {} - {}, 来源: {}",
                metadata.track(),
                metadata.artist(),
                source
            ),
            None => info!("未找到歌词: {} - {}", metadata.track(), metadata.artist()),
        }

        Ok(Some(self.result(metadata, identity, raw_lyrics, source, false)))
    }

    /// 解析歌词，未传入时解析最近一次获取到的歌词
    pub fn parse(&self, raw_lyrics: Option<&str>) -> Option<Vec<LyricEvent>> {
        let indicator = &self.config.instrumental_lyrics_indicator;
        match raw_lyrics {
            Some(raw) => parse_lyrics(Some(raw), indicator),
            None => {
                let last = self.last_lyrics.lock().unwrap();
                parse_lyrics(last.as_deref(), indicator)
            }
        }
    }

    /// 标记开始获取，同一首歌已在获取中时返回 `None`
    fn begin_fetch(&self, identity: &TrackIdentity) -> Option<FetchGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap();

        if let Some(current) = in_flight.get(identity) {
            match current {
                Some(source) => warn!("该歌曲正在从 {} 获取歌词，忽略本次请求", source),
                None => warn!("该歌曲正在获取歌词，忽略本次请求"),
            }
            return None;
        }

        in_flight.insert(identity.clone(), None);
        Some(FetchGuard {
            in_flight: &self.in_flight,
            identity: identity.clone(),
        })
    }

    /// 按顺序查询歌词源，返回第一个非空结果
    async fn fetch_from_providers(
        &self,
        metadata: &TrackMetadata,
        guard: &FetchGuard<'_>,
    ) -> (Option<String>, Option<LyricsSource>) {
        for source in &self.order {
            let Some(provider) = self.providers.get(source) else {
                debug!("歌词源 {} 没有可用的实现", source.key());
                continue;
            };

            guard.set_provider(*source);
            debug!("尝试从 {} 获取歌词", source);

            match provider.resolve(metadata).await {
                Ok(Some(lyrics)) if !lyrics.trim().is_empty() => {
                    return (Some(lyrics), Some(*source));
                }
                Ok(_) => debug!("{} 未找到歌词，尝试下一个歌词源", source),
                Err(e) => warn!("{} 获取歌词失败: {}", source, e),
            }
        }

        debug!("所有歌词源均未找到歌词");
        (None, None)
    }

    fn result(
        &self,
        metadata: &TrackMetadata,
        identity: TrackIdentity,
        raw_lyrics: Option<String>,
        source: Option<LyricsSource>,
        cached: bool,
    ) -> LyricsResult {
        LyricsResult {
            identity,
            raw_lyrics,
            track: metadata.track.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            source,
            cached,
            instrumental_indicator: self.config.instrumental_lyrics_indicator.clone(),
        }
    }
}
