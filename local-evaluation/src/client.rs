use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time;

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use url::Url;

use crate::api::errors::FlagError;
use crate::config::Config;

/// What the definitions endpoint answered. The body is only read for 200 responses
/// and is `None` when it wasn't valid JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionsResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl DefinitionsResponse {
    pub fn ok(body: Value) -> Self {
        DefinitionsResponse {
            status: 200,
            body: Some(body),
        }
    }

    pub fn status(status: u16) -> Self {
        DefinitionsResponse { status, body: None }
    }
}

/// Fetches flag, cohort and group type definitions for one project.
#[async_trait]
pub trait Client {
    async fn get_definitions(&self) -> Result<DefinitionsResponse, FlagError>;
}

pub struct HttpClient {
    client: reqwest::Client,
    url: Url,
}

impl HttpClient {
    pub fn new(
        url: Url,
        personal_api_key: &str,
        request_timeout: time::Duration,
        custom_headers: &HashMap<String, String>,
    ) -> Result<HttpClient, FlagError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        for (name, value) in custom_headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FlagError::ClientBuild(e.to_string()))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| FlagError::ClientBuild(e.to_string()))?;
            headers.insert(name, value);
        }

        let mut authorization = header::HeaderValue::from_str(&format!("Bearer {personal_api_key}"))
            .map_err(|e| FlagError::ClientBuild(e.to_string()))?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| FlagError::ClientBuild(e.to_string()))?;

        Ok(HttpClient { client, url })
    }

    pub fn from_config(
        config: &Config,
        custom_headers: &HashMap<String, String>,
    ) -> Result<HttpClient, FlagError> {
        let url = config
            .local_evaluation_url()
            .map_err(|e| FlagError::ClientBuild(e.to_string()))?;

        HttpClient::new(
            url,
            &config.personal_api_key,
            config.request_timeout.0,
            custom_headers,
        )
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn get_definitions(&self) -> Result<DefinitionsResponse, FlagError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status().as_u16();

        if status != 200 {
            return Ok(DefinitionsResponse::status(status));
        }

        // An unparsable body is a malformed response, not a transport failure
        let body = response.json::<Value>().await.ok();
        Ok(DefinitionsResponse { status, body })
    }
}

/// Replays canned responses in order, repeating the last one once exhausted.
#[derive(Clone, Default)]
pub struct MockClient {
    responses: Arc<Mutex<Vec<DefinitionsResponse>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockClient {
    pub fn new(responses: Vec<DefinitionsResponse>) -> MockClient {
        MockClient {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Client for MockClient {
    async fn get_definitions(&self) -> Result<DefinitionsResponse, FlagError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        let response = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or(DefinitionsResponse::status(404))
        };
        Ok(response)
    }
}
