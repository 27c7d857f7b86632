use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const DEFAULT_DATA_TYPE: &str = "json";

/// HTTP method for requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl Method {
    /// Methods whose payload travels in the request body.
    pub fn has_body(&self) -> bool {
        matches!(self, Method::PUT | Method::POST | Method::PATCH)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    /// Case-insensitive, so declarations may say `"get"` or `"GET"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            other => Err(format!("Invalid HTTP method: {}", other)),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => http::Method::GET,
            Method::POST => http::Method::POST,
            Method::PUT => http::Method::PUT,
            Method::DELETE => http::Method::DELETE,
            Method::PATCH => http::Method::PATCH,
            Method::HEAD => http::Method::HEAD,
            Method::OPTIONS => http::Method::OPTIONS,
        }
    }
}

/// Request data as handed to the transport.
///
/// `Value` is a live structure the transport may still shape (query string,
/// form body, JSON body). `Text` is already encoded and is sent verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum Payload {
    Value(serde_json::Value),
    Text(String),
}

impl Payload {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Value(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Value(_) => None,
            Payload::Text(text) => Some(text),
        }
    }
}

/// A fully resolved HTTP request, ready for an [`HttpExecutor`](crate::HttpExecutor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Absolute URL with every template token already substituted
    pub url: String,

    #[serde(default)]
    pub method: Method,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,

    /// Expected response format, e.g. `json`
    pub data_type: String,

    pub content_type: String,

    /// Ask the transport to defeat intermediary caches (GET only)
    #[serde(default)]
    pub cache_bust: bool,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HashMap::new(),
            data: None,
            data_type: DEFAULT_DATA_TYPE.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            cache_bust: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.data = Some(payload);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_cache_bust(mut self, cache_bust: bool) -> Self {
        self.cache_bust = cache_bust;
        self
    }

    /// Whether the content type names a JSON media type.
    pub fn is_json(&self) -> bool {
        self.content_type.contains("json")
    }
}

/// HTTP response from a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Status text (e.g., "OK", "Not Found")
    pub status_text: String,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body as JSON value
    /// Will be null if body was empty or not valid JSON
    pub body: serde_json::Value,

    /// Raw body as string (useful when body isn't JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
}

impl HttpResponse {
    /// Build a 200 response around a JSON body.
    pub fn ok(body: serde_json::Value) -> Self {
        let body_text = body.to_string();
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body,
            body_text: Some(body_text),
        }
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Try to deserialize the body into a specific type
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}
