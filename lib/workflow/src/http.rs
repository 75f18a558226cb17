//! HTTP-action descriptors and execution.
//!
//! An HTTP action specifies method, URL template, optional headers,
//! optional JSON body template, and optional auth. Both the node executor
//! and the edge router evaluate actions through [`HttpActionClient`]; the
//! asymmetry between them (a failed request hard-fails a node action but
//! soft-fails an edge condition) lives in the callers, not here.

use crate::template;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// HTTP method of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Auth descriptor for an HTTP action.
///
/// Token and key values are templates, rendered against the same scope as
/// the rest of the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HttpAuth {
    /// `Authorization: Bearer <token>`.
    Bearer { token: String },
    /// `X-API-Key: <key>`.
    ApiKey { key: String },
    /// Declared but unimplemented; building a request with it fails.
    Oauth2,
}

/// An HTTP-action descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpAction {
    /// Request method.
    pub method: HttpMethod,
    /// URL template.
    pub url: String,
    /// Header map; values are templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// JSON body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
    /// Auth descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HttpAuth>,
}

impl HttpAction {
    /// Creates an action with no headers, body, or auth.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: None,
            body: None,
            auth: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Sets the body template.
    #[must_use]
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the auth descriptor.
    #[must_use]
    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Errors from building or sending an HTTP action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpActionError {
    /// The request could not be constructed (bad URL or header value).
    BuildFailed { message: String },
    /// The auth scheme is declared but not implemented.
    UnsupportedAuth { scheme: String },
    /// The request failed in transit.
    Transport { message: String },
}

impl fmt::Display for HttpActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildFailed { message } => write!(f, "failed to build request: {message}"),
            Self::UnsupportedAuth { scheme } => {
                write!(f, "auth scheme \"{scheme}\" is not implemented")
            }
            Self::Transport { message } => write!(f, "request failed: {message}"),
        }
    }
}

impl std::error::Error for HttpActionError {}

/// Response of an executed HTTP action.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpActionResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body parsed as JSON; `Null` when empty or not JSON.
    pub body: JsonValue,
}

impl HttpActionResponse {
    /// Returns true for any 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes HTTP actions with templating and auth injection.
#[derive(Debug, Clone, Default)]
pub struct HttpActionClient {
    client: reqwest::Client,
}

impl HttpActionClient {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the request for an action: templates the URL, headers, auth
    /// values, and body against the scope.
    ///
    /// # Errors
    ///
    /// Fails on an unimplemented auth scheme or an unbuildable request.
    pub fn build_request(
        &self,
        action: &HttpAction,
        scope: &JsonValue,
    ) -> Result<reqwest::Request, HttpActionError> {
        let url = template::render_str(&action.url, scope);
        let mut builder = self.client.request(action.method.as_reqwest(), url);

        if let Some(headers) = &action.headers {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), template::render_str(value, scope));
            }
        }

        if let Some(auth) = &action.auth {
            builder = match auth {
                HttpAuth::Bearer { token } => builder.header(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", template::render_str(token, scope)),
                ),
                HttpAuth::ApiKey { key } => {
                    builder.header("X-API-Key", template::render_str(key, scope))
                }
                HttpAuth::Oauth2 => {
                    return Err(HttpActionError::UnsupportedAuth {
                        scheme: "oauth2".to_string(),
                    });
                }
            };
        }

        if let Some(body) = &action.body {
            builder = builder.json(&template::render_value(body, scope));
        }

        builder.build().map_err(|e| HttpActionError::BuildFailed {
            message: e.to_string(),
        })
    }

    /// Sends the action and returns the status plus the parsed body.
    ///
    /// A non-2xx status is NOT an error here; callers decide whether that
    /// hard-fails (node actions) or soft-fails (edge conditions).
    ///
    /// # Errors
    ///
    /// Fails on request-building problems or transport failures.
    pub async fn send(
        &self,
        action: &HttpAction,
        scope: &JsonValue,
    ) -> Result<HttpActionResponse, HttpActionError> {
        let request = self.build_request(action, scope)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| HttpActionError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| HttpActionError::Transport {
                message: e.to_string(),
            })?;
        let body = serde_json::from_str(&text).unwrap_or(JsonValue::Null);

        Ok(HttpActionResponse { status, body })
    }
}
