// 日志初始化

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// 日志级别
///
/// 序数: none=0 < info=1 < warn=2 < error=3 < debug=4。
/// 一条日志只有在配置级别的序数不小于该日志级别的序数时才会输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    pub fn ordinal(self) -> u8 {
        match self {
            LogLevel::None => 0,
            LogLevel::Info => 1,
            LogLevel::Warn => 2,
            LogLevel::Error => 3,
            LogLevel::Debug => 4,
        }
    }

    /// 判断某个 tracing 级别的日志是否应当输出，TRACE 按 debug 处理
    pub fn allows(self, level: &Level) -> bool {
        let required = match *level {
            Level::INFO => LogLevel::Info,
            Level::WARN => LogLevel::Warn,
            Level::ERROR => LogLevel::Error,
            _ => LogLevel::Debug,
        };
        self.ordinal() >= required.ordinal()
    }
}

/// 初始化全局日志
///
/// 设置了 `RUST_LOG` 时优先使用环境变量过滤规则。重复初始化会被忽略。
pub fn init(level: LogLevel) {
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let result = if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::registry()
            .with(layer.with_filter(EnvFilter::from_default_env()))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(layer.with_filter(filter_fn(move |meta| level.allows(meta.level()))))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("全局日志已初始化，跳过");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_blocks_everything() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            assert!(!LogLevel::None.allows(&level));
        }
    }

    #[test]
    fn test_ordinal_gate() {
        assert!(LogLevel::Info.allows(&Level::INFO));
        assert!(!LogLevel::Info.allows(&Level::WARN));
        assert!(LogLevel::Warn.allows(&Level::WARN));
        assert!(!LogLevel::Warn.allows(&Level::ERROR));
        assert!(LogLevel::Error.allows(&Level::ERROR));
        assert!(LogLevel::Error.allows(&Level::INFO));
        assert!(!LogLevel::Error.allows(&Level::DEBUG));
        assert!(LogLevel::Debug.allows(&Level::TRACE));
        assert!(LogLevel::Debug.allows(&Level::ERROR));
    }

    #[test]
    fn test_serde_names() {
        let level: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, LogLevel::Debug);
        assert_eq!(serde_json::to_string(&LogLevel::None).unwrap(), "\"none\"");
    }
}
