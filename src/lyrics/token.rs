//! Musixmatch 用户令牌管理
//!
//! 令牌获取流程:
//! - 先通过 [`TokenStore::load_token`] 读取外部保存的令牌，仍然有效则直接使用
//! - 否则请求 `token.get` 接口，禁用自动重定向
//! - 301 响应会下发反爬 Cookie，带上这些 Cookie 重新请求
//! - 响应体提示 captcha 时按 [`RetryPolicy`] 退避重试，次数有上限
//! - 拿到令牌后设置 10 分钟有效期，交给 [`TokenStore::save_token`] 保存
//!
//! 令牌本身只由外部保存，这里从不直接落盘。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{TokenError, TokenStoreError};
use crate::http::{HttpClient, RedirectPolicy};

pub const DEFAULT_BASE_URL: &str = "https://apic-desktop.musixmatch.com/ws/1.1";
pub const APP_ID: &str = "web-desktop-app-v1.0";

/// 令牌有效期（毫秒）
const TOKEN_TTL_MS: i64 = 10 * 60 * 1000;

/// Musixmatch 令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub user_token: String,
    pub cookies: Option<String>,
    /// 过期时间（Unix 毫秒）
    pub expires_at: i64,
}

impl TokenData {
    pub fn is_usable(&self, now_ms: i64) -> bool {
        !self.user_token.is_empty() && self.expires_at > now_ms
    }
}

/// 令牌持久化钩子
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 读取已保存的令牌
    async fn load_token(&self) -> Result<Option<TokenData>, TokenStoreError>;

    /// 保存新获取的令牌
    async fn save_token(&self, token: &TokenData) -> Result<(), TokenStoreError>;
}

/// 以 JSON 文件保存令牌
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load_token(&self) -> Result<Option<TokenData>, TokenStoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save_token(&self, token: &TokenData) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(token)?).await?;
        debug!("令牌已保存到 {:?}", self.path);
        Ok(())
    }
}

/// 只保存在内存中的令牌
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<TokenData>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: TokenData) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    pub fn current(&self) -> Option<TokenData> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load_token(&self) -> Result<Option<TokenData>, TokenStoreError> {
        Ok(self.current())
    }

    async fn save_token(&self, token: &TokenData) -> Result<(), TokenStoreError> {
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }
}

/// captcha 退避重试策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最多重试次数
    pub max_retries: u32,
    /// 首次等待秒数，之后每次翻倍
    pub base_delay_secs: u64,
    /// 单次等待上限（秒）
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 10,
            max_delay_secs: 60,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    /// 第 `attempt` 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let secs = self.base_delay_secs.saturating_mul(factor).min(self.max_delay_secs);
        Duration::from_secs(secs)
    }
}

/// 可替换的等待实现
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 可替换的时钟
pub trait Clock: Send + Sync {
    /// 当前 Unix 时间（毫秒）
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// 响应体是否为 "401 + captcha"
pub(crate) fn is_captcha(body: &Value) -> bool {
    body.pointer("/message/header/status_code").and_then(Value::as_i64) == Some(401)
        && body.pointer("/message/header/hint").and_then(Value::as_str) == Some("captcha")
}

/// 从 301 响应的 Set-Cookie 中提取 `name=value`，丢弃值为 `unknown` 的项
fn collect_cookies<'a>(set_cookies: impl Iterator<Item = &'a str>) -> String {
    set_cookies
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.rsplit('=').next() != Some("unknown"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Musixmatch 令牌管理器
pub struct TokenManager {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    max_redirects: u32,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl TokenManager {
    pub fn new(http: Arc<dyn HttpClient>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            store,
            retry: RetryPolicy::default(),
            max_redirects: 3,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/token.get?user_language=en&app_id={}",
            self.base_url, APP_ID
        )
    }

    /// 获取可用的令牌
    pub async fn acquire(&self) -> Result<TokenData, TokenError> {
        info!("获取 Musixmatch 令牌...");

        match self.store.load_token().await {
            Ok(Some(token)) if token.is_usable(self.clock.now_millis()) => {
                debug!("使用已保存的 Musixmatch 令牌");
                return Ok(token);
            }
            Ok(Some(_)) => debug!("已保存的 Musixmatch 令牌已过期"),
            Ok(None) => {}
            Err(e) => warn!("读取已保存的 Musixmatch 令牌失败: {}", e),
        }

        info!("从接口获取 Musixmatch 令牌...");

        let url = self.token_url();
        let mut cookies: Option<String> = None;
        let mut redirects = 0;
        let mut retries = 0;

        loop {
            let mut headers = Vec::new();
            if let Some(cookies) = cookies.as_deref() {
                headers.push(("cookie", cookies));
            }

            let response = self.http.get(&url, &headers, RedirectPolicy::Manual).await?;

            if response.status == 301 {
                if redirects >= self.max_redirects {
                    warn!("Musixmatch 令牌接口重定向次数过多");
                    return Err(TokenError::TooManyRedirects(redirects));
                }
                redirects += 1;

                debug!("收到 set-cookie 重定向响应，携带 Cookie 重新请求");
                cookies = Some(collect_cookies(response.header_values("set-cookie")));
                continue;
            }

            if !response.is_success() {
                warn!("Musixmatch 令牌接口请求失败: HTTP {}", response.status);
                return Err(TokenError::Status(response.status));
            }

            let body: Value = response.json()?;

            if is_captcha(&body) {
                if retries >= self.retry.max_retries {
                    warn!("Musixmatch 令牌接口持续限流，放弃重试");
                    return Err(TokenError::RateLimited(retries));
                }

                let delay = self.retry.delay_for(retries);
                warn!(
                    "Musixmatch 令牌接口被限流 (captcha)，{} 秒后重试",
                    delay.as_secs()
                );
                self.sleeper.sleep(delay).await;
                retries += 1;
                continue;
            }

            let Some(user_token) = body
                .pointer("/message/body/user_token")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
            else {
                info!("令牌接口响应中没有 user_token");
                return Err(TokenError::MissingToken);
            };

            let token = TokenData {
                user_token: user_token.to_string(),
                cookies,
                expires_at: self.clock.now_millis() + TOKEN_TTL_MS,
            };

            if let Err(e) = self.store.save_token(&token).await {
                warn!("保存 Musixmatch 令牌失败: {}", e);
            }

            info!("成功获取 Musixmatch 令牌");
            return Ok(token);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 只记录等待时长、不真正等待
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        pub slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock(pub i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::{FixedClock, RecordingSleeper};
    use super::*;
    use crate::http::testing::{json_response, text_response, MockHttpClient};
    use crate::http::HttpResponse;

    const NOW: i64 = 1_700_000_000_000;
    const TOKEN_URL: &str = "https://apic-desktop.musixmatch.com/ws/1.1/token.get";

    fn token_body(token: &str) -> Value {
        json!({"message": {"header": {"status_code": 200}, "body": {"user_token": token}}})
    }

    fn captcha_body() -> Value {
        json!({"message": {"header": {"status_code": 401, "hint": "captcha"}, "body": ""}})
    }

    fn redirect_response() -> HttpResponse {
        HttpResponse {
            status: 301,
            headers: vec![
                ("set-cookie".into(), "x-mxm-token-guid=abc; Path=/; Secure".into()),
                ("set-cookie".into(), "x-mxm-user-id=unknown; Path=/".into()),
                ("set-cookie".into(), "AWSELB=elb1; Path=/".into()),
            ],
            body: Vec::new(),
        }
    }

    fn manager(
        http: Arc<MockHttpClient>,
        store: Arc<MemoryTokenStore>,
        sleeper: Arc<RecordingSleeper>,
    ) -> TokenManager {
        TokenManager::new(http, store)
            .with_sleeper(sleeper)
            .with_clock(Arc::new(FixedClock(NOW)))
    }

    #[test]
    fn test_collect_cookies() {
        let cookies = collect_cookies(
            ["a=1; Path=/", "b=unknown; Secure", "c=3"].into_iter(),
        );
        assert_eq!(cookies, "a=1; c=3");
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for(2), Duration::from_secs(40));
        assert_eq!(policy.delay_for(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for(100), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_stored_token_short_circuits() {
        let http = Arc::new(MockHttpClient::new());
        let stored = TokenData {
            user_token: "saved".into(),
            cookies: Some("a=1".into()),
            expires_at: NOW + 1000,
        };
        let store = Arc::new(MemoryTokenStore::with_token(stored.clone()));
        let tm = manager(http.clone(), store, Arc::new(RecordingSleeper::default()));

        assert_eq!(tm.acquire().await.unwrap(), stored);
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let http = Arc::new(MockHttpClient::new().route(TOKEN_URL, json_response(200, token_body("fresh"))));
        let store = Arc::new(MemoryTokenStore::with_token(TokenData {
            user_token: "old".into(),
            cookies: None,
            expires_at: NOW - 1,
        }));
        let tm = manager(http.clone(), store.clone(), Arc::new(RecordingSleeper::default()));

        let token = tm.acquire().await.unwrap();
        assert_eq!(token.user_token, "fresh");
        assert_eq!(token.cookies, None);
        assert_eq!(token.expires_at, NOW + 10 * 60 * 1000);
        assert_eq!(store.current(), Some(token));

        let request = &http.requests()[0];
        assert_eq!(request.redirect, RedirectPolicy::Manual);
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_sets_cookies() {
        let http = Arc::new(
            MockHttpClient::new()
                .route(TOKEN_URL, redirect_response())
                .route(TOKEN_URL, json_response(200, token_body("tok"))),
        );
        let store = Arc::new(MemoryTokenStore::new());
        let tm = manager(http.clone(), store, Arc::new(RecordingSleeper::default()));

        let token = tm.acquire().await.unwrap();
        assert_eq!(
            token.cookies.as_deref(),
            Some("x-mxm-token-guid=abc; AWSELB=elb1")
        );

        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].headers,
            vec![("cookie".to_string(), "x-mxm-token-guid=abc; AWSELB=elb1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_endless_redirect_is_bounded() {
        let http = Arc::new(MockHttpClient::new().route(TOKEN_URL, redirect_response()));
        let tm = manager(
            http.clone(),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RecordingSleeper::default()),
        )
        .with_max_redirects(2);

        let err = tm.acquire().await.unwrap_err();
        assert!(matches!(err, TokenError::TooManyRedirects(2)));
        assert_eq!(http.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_captcha_backs_off_then_succeeds() {
        let http = Arc::new(
            MockHttpClient::new()
                .route(TOKEN_URL, json_response(200, captcha_body()))
                .route(TOKEN_URL, json_response(200, captcha_body()))
                .route(TOKEN_URL, json_response(200, token_body("tok"))),
        );
        let sleeper = Arc::new(RecordingSleeper::default());
        let tm = manager(http.clone(), Arc::new(MemoryTokenStore::new()), sleeper.clone());

        assert_eq!(tm.acquire().await.unwrap().user_token, "tok");
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );
    }

    #[tokio::test]
    async fn test_captcha_gives_up_after_max_retries() {
        let http = Arc::new(MockHttpClient::new().route(TOKEN_URL, json_response(200, captcha_body())));
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = Arc::new(MemoryTokenStore::new());
        let tm = manager(http.clone(), store.clone(), sleeper.clone()).with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay_secs: 1,
            max_delay_secs: 1,
        });

        let err = tm.acquire().await.unwrap_err();
        assert!(matches!(err, TokenError::RateLimited(2)));
        assert_eq!(http.requests().len(), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn test_error_status_and_missing_token() {
        let http = Arc::new(MockHttpClient::new().route(TOKEN_URL, text_response(503, "down")));
        let tm = manager(
            http,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RecordingSleeper::default()),
        );
        assert!(matches!(tm.acquire().await.unwrap_err(), TokenError::Status(503)));

        let http = Arc::new(MockHttpClient::new().route(
            TOKEN_URL,
            json_response(200, json!({"message": {"header": {"status_code": 200}, "body": {}}})),
        ));
        let tm = manager(
            http,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RecordingSleeper::default()),
        );
        assert!(matches!(tm.acquire().await.unwrap_err(), TokenError::MissingToken));
    }

    #[tokio::test]
    async fn test_transport_error_is_typed() {
        let http = Arc::new(MockHttpClient::new().route_error(TOKEN_URL, "connection reset"));
        let tm = manager(
            http,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RecordingSleeper::default()),
        );
        assert!(matches!(tm.acquire().await.unwrap_err(), TokenError::Http(_)));
    }

    #[tokio::test]
    async fn test_file_token_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("sub").join("token.json"));

        assert_eq!(store.load_token().await.unwrap(), None);

        let token = TokenData {
            user_token: "abc".into(),
            cookies: None,
            expires_at: NOW,
        };
        store.save_token(&token).await.unwrap();
        assert_eq!(store.load_token().await.unwrap(), Some(token));
    }
}
