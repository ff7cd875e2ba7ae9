use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::string::normalize;

/// 空白行与上一条歌词间隔超过该秒数时插入间奏标记
pub const INSTRUMENTAL_GAP_SECS: f64 = 3.0;

// 匹配行首时间标签: [mm:ss] 或 [mm:ss.xx]
static TIME_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+):(\d+(?:\.\d+)?)\](.*)$").unwrap());

// 将一行拆成 [标签] 与普通文本片段
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\[.*?\])|([^\[\]]+)").unwrap());

// 网易云歌词里的制作人员信息行，例如 "作词: 某人"、"Mixed by: xxx"
const CREDIT_TERMS: &[&str] = &[
    r"\s?作?\s*词|\s?作?\s*曲|\s?编\s*曲?|\s?监\s*制?",
    r".*编写|.*和音|.*和声|.*合声|.*提琴|.*录|.*工程|.*工作室|.*设计|.*剪辑|.*制作|.*发行|.*出品|.*后期|.*混音|.*缩混",
    r"原唱|翻唱|题字|文案|海报|古筝|二胡|钢琴|吉他|贝斯|笛子|鼓|弦乐| 人声 ",
    r"lrc|publish|vocal|guitar|program|produce|write|mix",
];

static CREDIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?i)^({}).*[:：]", CREDIT_TERMS.join("|"))).unwrap()
});

/// 单条歌词事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LyricEvent {
    /// 开始时间（秒）
    pub time: f64,
    /// 歌词文本，间奏时为间奏标记
    pub text: String,
}

impl LyricEvent {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

/// 解析 "[mm:ss.xx] 歌词" 格式的原始歌词
///
/// 输出保持输入顺序，不重新排序。只有时间标签没有文本的行表示间奏：
/// 当 `instrumental_indicator` 非空，且该行时间距上一条输出事件（没有则为 0）
/// 超过 [`INSTRUMENTAL_GAP_SECS`] 秒时，在该时间插入一条间奏标记。
pub fn parse_lyrics(raw: Option<&str>, instrumental_indicator: &str) -> Option<Vec<LyricEvent>> {
    let raw = raw?;
    let mut events = Vec::new();
    let mut last_time: Option<f64> = None;

    for line in raw.split('\n') {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let Some((time, text)) = parse_timed_line(line) else {
            debug!("跳过无法解析的歌词行: '{}'", line);
            continue;
        };

        if !text.is_empty() {
            last_time = Some(time);
            events.push(LyricEvent::new(time, text));
            continue;
        }

        if instrumental_indicator.is_empty() {
            continue;
        }

        if time - last_time.unwrap_or(0.0) > INSTRUMENTAL_GAP_SECS {
            last_time = Some(time);
            events.push(LyricEvent::new(time, instrumental_indicator));
        }
    }

    Some(events)
}

/// 解析单行，返回（秒，文本）
fn parse_timed_line(line: &str) -> Option<(f64, &str)> {
    let cap = TIME_TAG_RE.captures(line)?;
    let minutes = cap[1].parse::<f64>().ok()?;
    let seconds = cap[2].parse::<f64>().ok()?;
    let text = cap.get(3).map_or("", |m| m.as_str()).trim();

    Some((minutes * 60.0 + seconds, text))
}

/// 过滤网易云歌词中的制作人员信息行
///
/// 每行拆分为标签与文本片段，少于两个片段的行被丢弃；文本片段首字母大写、
/// 其余部分经过 [`normalize`] 处理。以制作人员标签加冒号开头的行被整行丢弃。
/// 输出仍为 "[time] text" 格式，可直接交给 [`parse_lyrics`]。
pub fn filter_netease_lyrics(raw: &str) -> String {
    let mut lyrics = Vec::new();

    for line in raw.lines().map(str::trim) {
        let mut tokens: Vec<&str> = TOKEN_RE.find_iter(line).map(|m| m.as_str()).collect();

        if tokens.len() < 2 {
            continue;
        }

        let text = match tokens.iter().position(|token| !token.ends_with(']')) {
            Some(index) => capitalize_and_normalize(tokens.remove(index)),
            None => String::new(),
        };

        if CREDIT_RE.is_match(&text) {
            debug!("丢弃网易云制作信息行: '{}'", line);
            continue;
        }

        lyrics.push(format!("{} {}", tokens[0], text.trim()));
    }

    lyrics.join("\n")
}

fn capitalize_and_normalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(normalize(chars.as_str()).chars()).collect(),
        None => String::new(),
    }
}
