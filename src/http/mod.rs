//! HTTP 客户端抽象，歌词源与令牌管理只依赖这里的 trait

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::HttpError;

mod reqwest_client;

pub use reqwest_client::ReqwestClient;

/// 重定向策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// 自动跟随重定向
    Follow,
    /// 不跟随，直接返回 3xx 响应
    Manual,
}

/// 统一的 HTTP 响应
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP 状态码
    pub status: u16,
    /// 响应头，同名头部（如多个 Set-Cookie）各占一项
    pub headers: Vec<(String, String)>,
    /// 响应体
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 返回指定头部的所有值（名称不区分大小写）
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

/// HTTP 客户端接口
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// 发送 GET 请求
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        redirect: RedirectPolicy,
    ) -> Result<HttpResponse, HttpError>;
}

/// 拼接带查询参数的 URL
pub fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String, HttpError> {
    let query = serde_urlencoded::to_string(params).map_err(|e| HttpError::Url(e.to_string()))?;
    Ok(format!("{base}?{query}"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_encodes_params() {
        let url = build_url("https://example.com/search", &[("q", "a b&c"), ("page", "1")]).unwrap();
        assert_eq!(url, "https://example.com/search?q=a+b%26c&page=1");
    }

    #[test]
    fn test_header_values_case_insensitive() {
        let response = HttpResponse {
            status: 301,
            headers: vec![
                ("Set-Cookie".into(), "a=1; Path=/".into()),
                ("content-type".into(), "text/plain".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            body: Vec::new(),
        };

        let cookies: Vec<&str> = response.header_values("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1; Path=/", "b=2"]);
        assert!(!response.is_success());
    }
}
