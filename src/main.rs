use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use sync_lyrics_rs::http::ReqwestClient;
use sync_lyrics_rs::logging::{self, LogLevel};
use sync_lyrics_rs::lyrics::token::FileTokenStore;
use sync_lyrics_rs::{Config, LyricEvent, LyricsManager, TrackMetadata};

/// 从 Musixmatch、LRCLIB 和网易云音乐获取同步歌词
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// 歌曲名
    #[arg(long)]
    track: Option<String>,

    /// 艺术家
    #[arg(long)]
    artist: Option<String>,

    /// 专辑
    #[arg(long)]
    album: Option<String>,

    /// 歌曲时长（毫秒），用于 Musixmatch 搜索
    #[arg(long)]
    duration_ms: Option<u64>,

    /// 配置文件路径，默认 ~/.config/sync-lyrics-rs/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// 按优先级排列的歌词源，逗号分隔（覆盖配置文件）
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,

    /// 日志级别（覆盖配置文件）
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// 输出原始歌词而不是解析后的歌词事件
    #[arg(long)]
    raw: bool,
}

impl Cli {
    fn metadata(&self) -> TrackMetadata {
        TrackMetadata {
            track: self.track.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

fn format_event(event: &LyricEvent) -> String {
    // 先取整到百分之一秒再拆分，避免出现 "00:60.00"
    let centis = (event.time * 100.0).round() as u64;
    let minutes = centis / 6000;
    let seconds = (centis % 6000) as f64 / 100.0;
    format!("[{:02}:{:05.2}] {}", minutes, seconds, event.text)
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.clone()).context("加载配置失败")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if !cli.sources.is_empty() {
        config.sources = cli.sources.clone();
    }

    logging::init(config.log_level);
    debug!("当前配置: {:?}", config);

    let token_store = Arc::new(FileTokenStore::new(config.token_path()));
    let manager = LyricsManager::builder(config)
        .http_client(Arc::new(ReqwestClient::new()?))
        .token_store(token_store)
        .build()?;

    let metadata = cli.metadata();
    let Some(result) = manager.get_lyrics(&metadata).await? else {
        info!("没有可用的歌词");
        return Ok(false);
    };

    let (Some(raw), Some(source)) = (result.raw_lyrics.as_deref(), result.source) else {
        return Ok(false);
    };

    println!("# {}", source);
    if cli.raw {
        println!("{}", raw);
    } else {
        for event in result.parse().unwrap_or_default() {
            println!("{}", format_event(&event));
        }
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tokio::select! {
        found = run(cli) => {
            if found? {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("未找到同步歌词");
                Ok(ExitCode::FAILURE)
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("已取消");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_event() {
        assert_eq!(format_event(&LyricEvent::new(65.5, "Hello")), "[01:05.50] Hello");
        assert_eq!(format_event(&LyricEvent::new(3.0, "♪")), "[00:03.00] ♪");
        assert_eq!(format_event(&LyricEvent::new(59.996, "Carry")), "[01:00.00] Carry");
        assert_eq!(format_event(&LyricEvent::new(119.994, "Edge")), "[01:59.99] Edge");
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "sync-lyrics",
            "--track",
            "Yellow",
            "--artist",
            "Coldplay",
            "--sources",
            "lrclib,netease",
            "--log-level",
            "debug",
            "--raw",
        ]);

        assert_eq!(cli.metadata(), TrackMetadata::new("Yellow", "Coldplay"));
        assert_eq!(cli.sources, vec!["lrclib", "netease"]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(cli.raw);
    }
}
