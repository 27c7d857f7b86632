//! HTTP execution capability.
//!
//! The engine never talks to the network itself. It hands a fully resolved
//! [`HttpRequest`] to an [`HttpExecutor`], which lets tests substitute a mock
//! and lets hosts bring their own transport.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use url::Url;

use crate::error::Error;
use crate::types::{HttpRequest, HttpResponse, Method, Payload};

/// Trait for executing HTTP requests.
///
/// Implementations block until the round-trip finishes. A non-2xx status is
/// still `Ok`; only failures to complete the exchange are `Err`.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

/// Production HTTP executor using reqwest.
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    /// Create a new executor with the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self, Error> {
        Self::new(Duration::from_secs(30))
    }
}

/// Methods whose data is appended to the URL instead of sent as a body.
fn carries_query(method: Method) -> bool {
    matches!(method, Method::GET | Method::HEAD)
}

fn accept_for(data_type: &str) -> &'static str {
    match data_type {
        "json" => "application/json, text/javascript, */*; q=0.01",
        "text" => "text/plain, */*; q=0.01",
        "html" => "text/html, */*; q=0.01",
        "xml" => "application/xml, text/xml, */*; q=0.01",
        _ => "*/*",
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten a payload object into name/value pairs.
///
/// Arrays repeat the key with a `[]` suffix; nested objects are sent as JSON.
fn payload_pairs(value: &serde_json::Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let serde_json::Value::Object(map) = value {
        for (key, value) in map {
            match value {
                serde_json::Value::Array(items) => {
                    let name = format!("{}[]", key);
                    for item in items {
                        pairs.push((name.clone(), scalar_to_string(item)));
                    }
                }
                other => pairs.push((key.clone(), scalar_to_string(other))),
            }
        }
    }
    pairs
}

fn append_raw_query(url: &mut Url, query: &str) {
    if query.is_empty() {
        return;
    }
    let combined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
        _ => query.to_string(),
    };
    url.set_query(Some(&combined));
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let method: http::Method = request.method.into();
        let mut url = Url::parse(&request.url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::try_from(name.as_str())?;
            let header_value = HeaderValue::try_from(value.as_str())?;
            headers.insert(header_name, header_value);
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(
                ACCEPT,
                HeaderValue::from_static(accept_for(&request.data_type)),
            );
        }

        let mut body = None;
        match &request.data {
            None => {}
            Some(Payload::Value(value)) if carries_query(request.method) => {
                let pairs = payload_pairs(value);
                if !pairs.is_empty() {
                    url.query_pairs_mut().extend_pairs(pairs);
                }
            }
            Some(Payload::Text(text)) if carries_query(request.method) => {
                append_raw_query(&mut url, text);
            }
            Some(Payload::Value(value)) if request.is_json() => {
                body = Some(serde_json::to_string(value)?);
            }
            Some(Payload::Value(value)) => {
                body = Some(
                    url::form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(payload_pairs(value))
                        .finish(),
                );
            }
            Some(Payload::Text(text)) => body = Some(text.clone()),
        }

        if request.cache_bust {
            let stamp = chrono::Utc::now().timestamp_millis().to_string();
            url.query_pairs_mut().append_pair("_", &stamp);
        }

        if body.is_some() {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::try_from(request.content_type.as_str())?,
            );
        }

        log::debug!("{} {}", request.method, url);

        let mut req_builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder.send()?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string();

        let mut resp_headers = std::collections::HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                resp_headers.insert(name.to_string(), v.to_string());
            }
        }

        let body_text = response.text()?;
        let body = serde_json::from_str(&body_text).unwrap_or(serde_json::Value::Null);

        Ok(HttpResponse {
            status,
            status_text,
            headers: resp_headers,
            body,
            body_text: Some(body_text),
        })
    }
}

/// Mock HTTP executor for testing.
///
/// Returns predefined responses keyed by request URL.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// A mock HTTP executor that returns predefined responses.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Responses keyed by request URL.
        responses: Arc<Mutex<HashMap<String, HttpResponse>>>,
        /// Default response when no match found.
        default_response: Arc<Mutex<Option<HttpResponse>>>,
        /// Recorded requests for verification.
        recorded_requests: Arc<Mutex<Vec<HttpRequest>>>,
        /// Error message returned for every request, if set.
        failure: Arc<Mutex<Option<String>>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a response for a specific URL.
        pub fn with_response(self, url: impl Into<String>, response: HttpResponse) -> Self {
            self.insert_response(url, response);
            self
        }

        /// Set a default response when no URL matches.
        pub fn with_default_response(self, response: HttpResponse) -> Self {
            *self.default_response.lock().unwrap() = Some(response);
            self
        }

        /// Configure to fail all requests with a transport error.
        pub fn fail_with(self, message: impl Into<String>) -> Self {
            *self.failure.lock().unwrap() = Some(message.into());
            self
        }

        /// Replace the response for `url` on a shared mock.
        pub fn insert_response(&self, url: impl Into<String>, response: HttpResponse) {
            self.responses.lock().unwrap().insert(url.into(), response);
        }

        /// Get all recorded requests.
        pub fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.recorded_requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.recorded_requests.lock().unwrap().len()
        }

        /// Clear recorded requests.
        pub fn clear_recorded(&self) {
            self.recorded_requests.lock().unwrap().clear();
        }

        /// Create a simple success response.
        pub fn success_response(body: serde_json::Value) -> HttpResponse {
            HttpResponse::ok(body)
        }

        /// Create a simple error response.
        pub fn error_response(status: u16, message: &str) -> HttpResponse {
            HttpResponse {
                status,
                status_text: message.to_string(),
                headers: HashMap::new(),
                body: serde_json::json!({"error": message}),
                body_text: Some(format!(r#"{{"error":"{}"}}"#, message)),
            }
        }

        /// Create a 404 Not Found response.
        pub fn not_found() -> HttpResponse {
            Self::error_response(404, "Not Found")
        }
    }

    impl HttpExecutor for MockExecutor {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
            self.recorded_requests.lock().unwrap().push(request.clone());

            if let Some(message) = self.failure.lock().unwrap().clone() {
                return Err(Error::Transport { message });
            }

            if let Some(response) = self.responses.lock().unwrap().get(&request.url) {
                return Ok(response.clone());
            }

            if let Some(ref response) = *self.default_response.lock().unwrap() {
                return Ok(response.clone());
            }

            Ok(Self::not_found())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockExecutor;
    use super::*;
    use serde_json::json;

    #[test]
    fn mock_executor_returns_configured_response() {
        let executor = MockExecutor::new().with_response(
            "http://example.com/test",
            MockExecutor::success_response(json!({"result": "success"})),
        );

        let result = executor
            .execute(&HttpRequest::get("http://example.com/test"))
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.body, json!({"result": "success"}));
    }

    #[test]
    fn mock_executor_returns_404_when_no_match() {
        let executor = MockExecutor::new();
        let result = executor
            .execute(&HttpRequest::get("http://example.com/unknown"))
            .unwrap();
        assert_eq!(result.status, 404);
    }

    #[test]
    fn mock_executor_fails_when_configured() {
        let executor = MockExecutor::new().fail_with("Network error");
        let result = executor.execute(&HttpRequest::get("http://example.com/any"));

        match result {
            Err(Error::Transport { message }) => assert_eq!(message, "Network error"),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[test]
    fn mock_executor_records_requests() {
        let executor =
            MockExecutor::new().with_default_response(MockExecutor::success_response(json!(null)));

        executor
            .execute(&HttpRequest::get("http://example.com/first"))
            .unwrap();
        executor
            .execute(&HttpRequest::post("http://example.com/second"))
            .unwrap();

        let recorded = executor.recorded_requests();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].method, Method::GET);
        assert_eq!(recorded[1].url, "http://example.com/second");

        executor.clear_recorded();
        assert_eq!(executor.request_count(), 0);
    }

    #[test]
    fn payload_pairs_flatten_scalars_and_arrays() {
        let pairs = payload_pairs(&json!({
            "sort": "desc",
            "page": 2,
            "ids": [1, 2],
            "missing": null,
        }));

        assert!(pairs.contains(&("sort".to_string(), "desc".to_string())));
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
        assert!(pairs.contains(&("ids[]".to_string(), "1".to_string())));
        assert!(pairs.contains(&("ids[]".to_string(), "2".to_string())));
        assert!(pairs.contains(&("missing".to_string(), String::new())));
    }

    #[test]
    fn raw_query_is_appended_after_existing_query() {
        let mut url = Url::parse("http://example.com/search?q=a").unwrap();
        append_raw_query(&mut url, "page=2");
        assert_eq!(url.as_str(), "http://example.com/search?q=a&page=2");
    }

    #[test]
    fn accept_header_follows_data_type() {
        assert!(accept_for("json").starts_with("application/json"));
        assert_eq!(accept_for("binary"), "*/*");
    }

    #[test]
    fn reqwest_executor_creation() {
        assert!(ReqwestExecutor::with_default_timeout().is_ok());
        assert!(ReqwestExecutor::new(Duration::from_secs(10)).is_ok());
    }
}
