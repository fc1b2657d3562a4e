//! API Client
//!
//! Thin JSON client for the ticket desk REST API with bearer-token attachment.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{ClientError, Result};

// == API Client ==
/// HTTP client bound to one backend base URL.
///
/// Clones share the connection pool and the stored token, so logging out
/// through any clone signs every clone out.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    // == Constructor ==
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "API URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Creates a client from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // == Token Storage ==
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    // == Requests ==
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request without credentials (login).
    fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Request carrying the stored bearer token.
    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token().ok_or(ClientError::Unauthenticated)?;
        Ok(self.public(method, path).bearer_auth(token))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.authorized(Method::GET, path)?;
        send(request).await
    }

    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.authorized(Method::GET, path)?.query(query);
        send(request).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.authorized(Method::POST, path)?.json(body);
        send(request).await
    }

    pub async fn patch_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.authorized(Method::PATCH, path)?.json(body);
        send(request).await
    }

    /// `POST` without a token; used for login.
    pub async fn post_public<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.public(Method::POST, path).json(body);
        send(request).await
    }
}

/// Sends a request and decodes a JSON success body.
///
/// Non-2xx answers become `ClientError::Api` carrying the backend's message.
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().clone();
    let body = response.text().await?;

    debug!(%url, status = status.as_u16(), "api response");

    if !status.is_success() {
        return Err(ClientError::from_response(status.as_u16(), &body));
    }

    Ok(serde_json::from_str(&body)?)
}
