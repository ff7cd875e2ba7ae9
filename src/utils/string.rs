use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// 全角标点到半角标点的替换表，按顺序应用
const PUNCTUATION_MAP: &[(&[char], &str)] = &[
    (&['（'], "("),
    (&['）'], ")"),
    (&['【'], "["),
    (&['】'], "]"),
    (&['。'], ". "),
    (&['；'], "; "),
    (&['：'], ": "),
    (&['？'], "? "),
    (&['！'], "! "),
    (&['、', '，'], ", "),
    (&['‘', '’', '′', '＇'], "'"),
    (&['“', '”'], "\""),
    (&['〜'], "~"),
    (&['·', '・'], "•"),
];

/// 规范化歌词文本
///
/// 将中日文全角标点替换为半角形式，统一引号、波浪号和间隔号，
/// 合并连续空白并去除首尾空白。纯函数，对任意输入都有定义。
pub fn normalize(input: &str) -> String {
    let mut result = String::with_capacity(input.len());

    for ch in input.chars() {
        match PUNCTUATION_MAP
            .iter()
            .find(|(from, _)| from.contains(&ch))
        {
            Some((_, to)) => result.push_str(to),
            None => result.push(ch),
        }
    }

    WHITESPACE_RE.replace_all(&result, " ").trim().to_string()
}
