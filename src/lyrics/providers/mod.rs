mod lrclib;
mod musixmatch;
mod netease;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::HttpClient;
use crate::lyrics::token::{Sleeper, TokenManager, TokenStore};
use crate::lyrics::{LyricsProvider, LyricsSource};

pub use lrclib::LrclibProvider;
pub use musixmatch::MusixmatchProvider;
pub use netease::NeteaseProvider;

/// 把配置中的歌词源名称解析为查询顺序
///
/// 未知名称会被跳过；一个都不认识时使用默认顺序。重复的名称只保留第一次出现。
pub fn resolve_source_order(names: &[String]) -> Vec<LyricsSource> {
    debug!("解析歌词源顺序，配置的源: {:?}", names);

    let mut order = Vec::new();
    for name in names {
        match name.parse::<LyricsSource>() {
            Ok(source) if !order.contains(&source) => order.push(source),
            Ok(source) => debug!("重复的歌词源: {}", source.key()),
            Err(e) => info!("{}，已跳过", e),
        }
    }

    if order.is_empty() {
        warn!("没有可识别的歌词源，使用默认顺序");
        order = LyricsSource::DEFAULT_ORDER.to_vec();
    }

    order
}

/// 为每个歌词源创建默认提供者
pub fn default_providers(
    config: &Config,
    http: Arc<dyn HttpClient>,
    token_store: Arc<dyn TokenStore>,
    sleeper: Option<Arc<dyn Sleeper>>,
) -> HashMap<LyricsSource, Arc<dyn LyricsProvider>> {
    let endpoints = &config.endpoints;

    let mut token_manager = TokenManager::new(http.clone(), token_store)
        .with_retry_policy(config.musixmatch.token_retry.clone())
        .with_max_redirects(config.musixmatch.max_redirects);
    if let Some(sleeper) = sleeper {
        token_manager = token_manager.with_sleeper(sleeper);
    }

    // 令牌接口与歌词接口在同一个主机下
    if let Some(url) = &endpoints.musixmatch {
        info!("Musixmatch 使用自定义接口地址: {}", url);
        token_manager = token_manager.with_base_url(url.as_str());
    }
    let mut musixmatch = MusixmatchProvider::new(http.clone(), Arc::new(token_manager));
    if let Some(url) = &endpoints.musixmatch {
        musixmatch = musixmatch.with_base_url(url.as_str());
    }

    let mut lrclib = LrclibProvider::new(http.clone());
    if let Some(url) = &endpoints.lrclib {
        info!("LRCLIB 使用自定义接口地址: {}", url);
        lrclib = lrclib.with_base_url(url.as_str());
    }

    let mut netease = NeteaseProvider::new(http);
    if let Some(url) = &endpoints.netease {
        info!("网易云音乐使用自定义接口地址: {}", url);
        netease = netease.with_base_url(url.as_str());
    }

    let mut providers: HashMap<LyricsSource, Arc<dyn LyricsProvider>> = HashMap::new();
    providers.insert(LyricsSource::Musixmatch, Arc::new(musixmatch));
    providers.insert(LyricsSource::Lrclib, Arc::new(lrclib));
    providers.insert(LyricsSource::Netease, Arc::new(netease));
    providers
}
