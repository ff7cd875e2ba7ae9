use thiserror::Error;

/// 调用方可见的错误
#[derive(Error, Debug)]
pub enum SyncLyricsError {
    #[error("至少需要提供歌曲名、艺术家或专辑中的一项")]
    InvalidMetadata,

    #[error("至少需要配置一个歌词源")]
    NoSources,

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP 客户端初始化失败: {0}")]
    Http(#[from] HttpError),
}

/// 传输层错误
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("请求失败: {0}")]
    Request(String),

    #[error("响应体解析失败: {0}")]
    Decode(String),

    #[error("URL 编码失败: {0}")]
    Url(String),
}

/// Musixmatch 令牌获取失败的原因
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("令牌接口返回 HTTP {0}")]
    Status(u16),

    #[error("令牌接口请求失败: {0}")]
    Http(#[from] HttpError),

    #[error("令牌接口响应中没有 user_token")]
    MissingToken,

    #[error("令牌接口持续触发验证码，已重试 {0} 次")]
    RateLimited(u32),

    #[error("令牌接口重定向次数过多 ({0})")]
    TooManyRedirects(u32),
}

/// 令牌持久化钩子的错误
#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("令牌文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("令牌序列化失败: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 歌词源内部错误，不会越过歌词源边界
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    Http(#[from] HttpError),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("用户令牌因请求过多被临时封禁 (captcha)")]
    Captcha,

    #[error("获取 Musixmatch 令牌失败: {0}")]
    Token(#[from] TokenError),
}

pub type Result<T> = std::result::Result<T, SyncLyricsError>;
