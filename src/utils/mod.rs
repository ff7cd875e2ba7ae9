// 通用工具：歌词解析与文本规范化

pub mod lrc;
pub mod string;

pub use lrc::{filter_netease_lyrics, parse_lyrics, LyricEvent, INSTRUMENTAL_GAP_SECS};
pub use string::normalize;
