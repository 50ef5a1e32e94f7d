//! HTTP transport for the CDM service.
//!
//! Abstracts the HTTP client for testability:
//! - `Transport`: one request in, one decoded JSON body out
//! - `HttpTransport`: blocking ureq client with Basic credentials
//!
//! Credentials are an immutable value owned by the transport, so every
//! outbound call carries the same identity for the whole run.
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Basic-auth credentials for the service account.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A request relative to the instance base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub content_type: &'static str,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path.into())
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path.into())
    }

    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
            content_type: CONTENT_TYPE_TEXT,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Skip absent attributes instead of sending empty values.
    pub fn query_opt(self, key: &str, value: Option<&str>) -> Self {
        match value.filter(|value| !value.trim().is_empty()) {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    #[cfg(test)]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Transport errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Status code: {code}. Response data: {body}")]
    Status { code: u16, body: String },

    #[error("No response received. Error: {0}")]
    NoResponse(String),

    #[error("Error: {0}")]
    Request(String),

    #[error("Unexpected response from {path}: {detail}")]
    Decode { path: String, detail: String },
}

impl TransportError {
    pub fn decode(path: &str, detail: impl fmt::Display) -> Self {
        TransportError::Decode {
            path: path.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Transport trait for CDM communication
pub trait Transport {
    /// Send a request and return the decoded JSON body (`Null` when empty).
    fn send(&self, request: &Request) -> Result<Value, TransportError>;
}

/// Decode a JSON body into a typed response, naming the path on failure.
pub fn decode<T: serde::de::DeserializeOwned>(path: &str, value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|err| TransportError::decode(path, err))
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let authorization = self.credentials.authorization();
        tracing::info!(method = %request.method, url = %url, "request initiating");

        let sent = match request.method {
            Method::Get => {
                let mut builder = self
                    .agent
                    .get(&url)
                    .header("Authorization", &authorization)
                    .header("Content-Type", request.content_type);
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = self
                    .agent
                    .post(&url)
                    .header("Authorization", &authorization)
                    .header("Content-Type", request.content_type);
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                match &request.body {
                    Some(body) => builder.send(body.as_str()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = sent.map_err(classify_error)?;
        let code = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::NoResponse(err.to_string()))?;
        tracing::info!(method = %request.method, url = %url, status = code, "response received");

        if !(200..300).contains(&code) {
            return Err(TransportError::Status { code, body });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| TransportError::decode(&request.path, err))
    }
}

fn classify_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => TransportError::NoResponse(err.to_string()),
        other => TransportError::Request(other.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_is_basic_base64() {
        let credentials = Credentials::new("admin", "secret");
        assert_eq!(credentials.authorization(), "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("admin", "secret"));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn optional_query_values_are_skipped_when_blank() {
        let request = Request::get("/x")
            .query_opt("collectionName", None)
            .query_opt("deployableName", Some(" "))
            .query_opt("appName", Some("shop"));
        assert_eq!(request.query, vec![("appName".to_string(), "shop".to_string())]);
        assert_eq!(request.query_value("appName"), Some("shop"));
    }

    #[test]
    fn status_error_carries_code_and_body() {
        let err = TransportError::Status {
            code: 401,
            body: "{\"error\":\"denied\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Status code: 401. Response data: {\"error\":\"denied\"}"
        );
    }
}
