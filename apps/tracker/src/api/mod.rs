//! REST client for the resume-tailoring backend.
//!
//! Every backend call in the crate goes through `ApiClient`. No retries and
//! no caching happen here: a non-2xx response is surfaced as `ApiError::Api`
//! carrying the server's message when it sent one.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod applications;
pub mod generation;
pub mod resources;

pub use applications::ApplicationApi;
pub use generation::GenerationApi;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// The message worth showing to a user: the server's text when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Api { message, .. } => message.clone(),
            ApiError::Http(e) if e.is_timeout() => "The server took too long to respond".to_string(),
            ApiError::Http(_) => "Could not reach the server".to_string(),
            ApiError::Parse(_) => "The server sent an unexpected response".to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Parse(_) => None,
        }
    }
}

/// Upper bound on pages followed by one list call.
const MAX_PAGES: usize = 500;

/// List endpoints answer either with a bare array or a paginated envelope
/// whose `next` is the absolute URL of the following page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse<T> {
    Paginated {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
    },
    Plain(Vec<T>),
}

impl<T> ListResponse<T> {
    /// Rows of this page and the URL of the next one, if any.
    pub(crate) fn into_page(self) -> (Vec<T>, Option<String>) {
        match self {
            ListResponse::Paginated { results, next } => (results, next),
            ListResponse::Plain(items) => (items, None),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api`.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("GET {path}");
        self.send(self.client.get(self.url(path))).await
    }

    /// Every row of a list endpoint, following `next` until the last page.
    pub(crate) async fn fetch_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        debug!("GET {path} (all pages)");
        self.fetch_pages(self.client.get(self.url(path))).await
    }

    pub(crate) async fn fetch_list_with_query<T, Q>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        debug!("GET {path} (all pages, with query)");
        self.fetch_pages(self.client.get(self.url(path)).query(query))
            .await
    }

    async fn fetch_pages<T: DeserializeOwned>(
        &self,
        first: RequestBuilder,
    ) -> Result<Vec<T>, ApiError> {
        let mut rows = Vec::new();
        let mut request = first;

        for _ in 0..MAX_PAGES {
            let page: ListResponse<T> = self.send(request).await?;
            let (items, next) = page.into_page();
            rows.extend(items);
            match next {
                Some(url) => request = self.client.get(url),
                None => return Ok(rows),
            }
        }

        warn!(pages = MAX_PAGES, "Stopped following list pages");
        Ok(rows)
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {path}");
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("POST {path}");
        self.send(self.client.post(self.url(path))).await
    }

    pub(crate) async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ApiError> {
        debug!("POST {path} (multipart)");
        self.send(self.client.post(self.url(path)).multipart(form)).await
    }

    pub(crate) async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PUT {path}");
        self.send(self.client.put(self.url(path)).json(body)).await
    }

    pub(crate) async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PATCH {path}");
        self.send(self.client.patch(self.url(path)).json(body)).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        debug!("DELETE {path}");
        self.execute(self.client.delete(self.url(path))).await?;
        Ok(())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(ApiError::Parse)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}`,
/// `{"detail": "..."}`, `{"message": "..."}` and field-validation maps such as
/// `{"title": ["This field is required."]}`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    for key in ["error", "detail", "message"] {
        match object.get(key) {
            Some(Value::String(message)) if !message.trim().is_empty() => {
                return Some(message.clone());
            }
            Some(Value::Object(nested)) => {
                if let Some(Value::String(message)) = nested.get("message") {
                    return Some(message.clone());
                }
            }
            _ => {}
        }
    }

    object.iter().find_map(|(field, value)| match value {
        Value::Array(messages) => messages
            .iter()
            .find_map(Value::as_str)
            .map(|message| format!("{field}: {message}")),
        _ => None,
    })
}
