use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const USER_AGENT_VALUE: &str = "rhc-enable/0.1";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{operation} failed, HTTP code: {status}, response: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to parse {operation} response")]
    Parse {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: String,
}

impl ResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns any status outside 200-299 into an [`ApiError::Status`].
    pub fn expect_success(self, operation: &str) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                operation: operation.to_string(),
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, operation: &str) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|source| ApiError::Parse {
            operation: operation.to_string(),
            source,
        })
    }
}

/// Blocking HTTP caller using basic auth. Non-2xx responses are returned,
/// not raised; callers decide with [`ResponseData::expect_success`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    api_key: String,
    api_secret: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str, insecure: bool) -> Result<Self> {
        let parsed = Url::parse(base_url).context("parsing base URL")?;
        let http = Client::builder()
            .user_agent(HeaderValue::from_static(USER_AGENT_VALUE))
            .danger_accept_invalid_certs(insecure)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            base_url: parsed,
            http,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    pub fn get(&self, path: &str) -> Result<ResponseData> {
        self.call(Method::GET, path, Option::<&Value>::None)
    }

    pub fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ResponseData> {
        self.call(Method::PUT, path, Some(body))
    }

    pub fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ResponseData> {
        self.call(Method::POST, path, Some(body))
    }

    pub fn call<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<ResponseData> {
        let normalized = path.trim_start_matches('/');
        let url = self
            .base_url
            .join(normalized)
            .with_context(|| format!("joining path `{}` to base URL", path))?;

        debug!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .with_context(|| format!("sending {} {}", method, url))?;

        let status = response.status().as_u16();
        let text = response.text().context("reading response body")?;
        debug!(status, "received response");

        Ok(ResponseData { status, body: text })
    }
}
