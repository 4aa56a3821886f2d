//! PostgREST client for the smart-bookmarks dashboard
//!
//! A small query builder over Supabase's `/rest/v1` endpoint covering what
//! the dashboard issues: filtered and ordered selects, inserts and deletes,
//! all carrying the user's bearer token so row-level security applies.

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// PostgREST APIエラーの詳細情報
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// エラー型
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// ソート方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// PostgREST クライアント
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    /// 新しい PostgREST クライアントを作成
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
        }
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// 認証トークンを設定
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    fn set_param(mut self, key: &str, value: String) -> Self {
        self.query_params.retain(|(k, _)| k != key);
        self.query_params.push((key.to_string(), value));
        self
    }

    /// 取得するカラムを指定
    pub fn select(self, columns: &str) -> Self {
        self.set_param("select", columns.to_string())
    }

    /// 等価フィルター
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .push((column.to_string(), format!("eq.{}", value)));
        self
    }

    /// ソート順を指定
    pub fn order(self, column: &str, order: SortOrder) -> Self {
        self.set_param("order", format!("{}.{}", column, order.as_str()))
    }

    /// 取得件数を制限
    pub fn limit(self, count: u32) -> Self {
        self.set_param("limit", count.to_string())
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        body: Option<Vec<u8>>,
        prefer: Option<&'static str>,
    ) -> Result<reqwest::Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let mut headers = self.headers.clone();
        if let Some(prefer) = prefer {
            headers.insert(
                HeaderName::from_static("prefer"),
                HeaderValue::from_static(prefer),
            );
        }

        let mut request = self
            .http_client
            .request(method, url)
            .headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => Err(PostgrestError::ApiError { details, status }),
            Err(_) => Err(PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            }),
        }
    }

    /// データを取得
    pub async fn execute<T: for<'de> Deserialize<'de>>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, None, None).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// データを挿入
    ///
    /// Returns the inserted rows (`Prefer: return=representation`), or
    /// `Value::Null` when the server answers with an empty body.
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let body = serde_json::to_vec(&values)?;
        let response = self
            .send(Method::POST, Some(body), Some("return=representation"))
            .await?;
        read_optional_json(response).await
    }

    /// データを削除
    ///
    /// Without a filter PostgREST would delete every visible row, so at least
    /// one filter is required.
    pub async fn delete(&self) -> Result<Value, PostgrestError> {
        let has_filter = self
            .query_params
            .iter()
            .any(|(k, _)| k != "select" && k != "order" && k != "limit");
        if !has_filter {
            return Err(PostgrestError::InvalidParameters(
                "delete requires at least one filter".to_string(),
            ));
        }

        let response = self
            .send(Method::DELETE, None, Some("return=representation"))
            .await?;
        read_optional_json(response).await
    }
}

async fn read_optional_json(response: reqwest::Response) -> Result<Value, PostgrestError> {
    let body_text = response.text().await.map_err(|e| {
        PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
    })?;

    if body_text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str::<Value>(&body_text)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}
