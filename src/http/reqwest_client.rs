use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::HttpError;
use crate::http::{HttpClient, HttpResponse, RedirectPolicy};

const REQWEST_TIMEOUT: u64 = 10;

/// 基于 `reqwest` 的默认实现
///
/// 手动重定向需要独立的 `reqwest::Client`，因此内部持有两个客户端。
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    no_redirect_client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQWEST_TIMEOUT))
            .build()
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let no_redirect_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQWEST_TIMEOUT))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HttpError::Request(e.to_string()))?;

        Ok(Self {
            client,
            no_redirect_client,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        redirect: RedirectPolicy,
    ) -> Result<HttpResponse, HttpError> {
        let client = match redirect {
            RedirectPolicy::Follow => &self.client,
            RedirectPolicy::Manual => &self.no_redirect_client,
        };

        let mut request = client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = convert_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// 保留同名头部的每一个值
fn convert_headers(header_map: &HeaderMap) -> Vec<(String, String)> {
    header_map
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, SET_COOKIE};

    #[test]
    fn test_convert_headers_keeps_duplicates() {
        let mut map = HeaderMap::new();
        map.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        map.append(SET_COOKIE, HeaderValue::from_static("b=2"));

        let headers = convert_headers(&map);
        assert_eq!(headers.len(), 2);
        assert!(headers.iter().all(|(name, _)| name == "set-cookie"));
    }

    #[test]
    fn test_new_client() {
        assert!(ReqwestClient::new().is_ok());
    }
}
