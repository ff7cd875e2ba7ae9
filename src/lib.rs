// 同步歌词获取核心库

// 模块导出
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod lyrics;
pub mod utils;

pub use config::Config;
pub use error::{Result, SyncLyricsError};
pub use lyrics::{LyricsManager, LyricsResult, LyricsSource, TrackIdentity, TrackMetadata};
pub use utils::{normalize, parse_lyrics, LyricEvent};
