//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tools_api::models::ErrorResponse;
use tracing::{debug, error};
use url::Url;

use crate::errors::ControllerError;

/// HTTP client for the tools API
pub struct HttpClient {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ControllerError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ControllerError::ConfigError(format!(
                "Invalid tools API URL: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build the URL of an endpoint, each segment is percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ControllerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ControllerError::ConfigError(format!("Invalid tools API URL: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Make a GET request, a 404 answer is `None`
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<Option<T>, ControllerError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);

        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(Method::GET, response).await?;
        let body = response.json().await?;
        Ok(Some(body))
    }

    /// Make a POST request without body
    pub async fn post<Q: Serialize>(
        &self,
        segments: &[&str],
        query: &Q,
    ) -> Result<(), ControllerError> {
        let url = self.endpoint(segments)?;
        debug!("POST {}", url);

        let response = self.request(Method::POST, url).query(query).send().await?;
        check_status(Method::POST, response).await?;
        Ok(())
    }

    /// Make a DELETE request
    pub async fn delete(&self, segments: &[&str]) -> Result<(), ControllerError> {
        let url = self.endpoint(segments)?;
        debug!("DELETE {}", url);

        let response = self.request(Method::DELETE, url).send().await?;
        check_status(Method::DELETE, response).await?;
        Ok(())
    }
}

async fn check_status(method: Method, response: Response) -> Result<Response, ControllerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message())
        .unwrap_or(body);
    error!("HTTP {} failed: {} - {}", method, status, message);

    Err(ControllerError::HttpStatus {
        status: status.as_u16(),
        message,
    })
}
