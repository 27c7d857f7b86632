//! Request descriptors and their resolved form.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sycamore_http::{
    HttpRequest, HttpResponse, Method, Outcome, RequestError, DEFAULT_CONTENT_TYPE,
    DEFAULT_DATA_TYPE,
};

use crate::host::{Callback, DataFn, Host, HostMember};

/// Produces a header value at execution time.
pub type HeaderFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Replaces default transport-request construction. It receives the request
/// the engine would have sent and returns the one to send instead.
pub type BuildRequestFn<H> = Arc<dyn Fn(&H, HttpRequest) -> HttpRequest + Send + Sync>;

/// Where request data comes from.
pub enum DataSource<H> {
    Static(Value),
    /// Name of a host member, bound at registration.
    Named(String),
    Inline(DataFn<H>),
}

#[derive(Clone)]
pub enum HeaderSource {
    Literal(String),
    Computed(HeaderFn),
}

impl HeaderSource {
    pub fn value(&self) -> String {
        match self {
            HeaderSource::Literal(value) => value.clone(),
            HeaderSource::Computed(f) => f(),
        }
    }
}

impl std::fmt::Debug for HeaderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderSource::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            HeaderSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Headers {
    Map(BTreeMap<String, HeaderSource>),
    /// Name of a host member holding a header object.
    Named(String),
}

impl Default for Headers {
    fn default() -> Self {
        Headers::Map(BTreeMap::new())
    }
}

pub enum CallbackRef<H> {
    Named(String),
    Bound(Callback<H>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    #[default]
    Memory,
    /// The requester's persistent key-value store.
    Local,
}

/// Caching policy for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub key: String,
    /// Minutes a cached response stays fresh
    #[serde(alias = "expiresAfter")]
    pub expires_after: f64,
    #[serde(default)]
    pub store: CacheStoreKind,
}

impl CacheSpec {
    pub fn memory(key: impl Into<String>, expires_after: f64) -> Self {
        Self {
            key: key.into(),
            expires_after,
            store: CacheStoreKind::Memory,
        }
    }

    pub fn local(key: impl Into<String>, expires_after: f64) -> Self {
        Self {
            key: key.into(),
            expires_after,
            store: CacheStoreKind::Local,
        }
    }

    /// How long a stored response stays fresh, or `None` if it never expires.
    ///
    /// NaN, zero and negative windows expire immediately. Positive infinity and
    /// windows too long for `chrono::Duration` never expire.
    pub fn ttl(&self) -> Option<chrono::Duration> {
        let minutes = self.expires_after;
        if minutes.is_nan() || minutes <= 0.0 {
            return Some(chrono::Duration::zero());
        }
        let millis = (minutes * 60_000.0).round();
        if !millis.is_finite() || millis >= i64::MAX as f64 {
            return None;
        }
        chrono::Duration::try_milliseconds(millis as i64)
    }
}

/// Declarative configuration for one HTTP request.
pub struct Descriptor<H> {
    pub url: String,
    pub method: Method,
    pub data: Option<DataSource<H>>,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub data_type: Option<String>,
    pub done: Option<CallbackRef<H>>,
    pub fail: Option<CallbackRef<H>>,
    pub always: Option<CallbackRef<H>>,
    /// Receiver for data functions and callbacks in place of the host
    pub context: Option<Arc<H>>,
    pub cache: Option<CacheSpec>,
    pub delay_for: Option<Duration>,
    pub nocache: bool,
    pub build_request: Option<BuildRequestFn<H>>,
}

impl<H> Descriptor<H> {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            data: None,
            headers: Headers::default(),
            content_type: None,
            data_type: None,
            done: None,
            fail: None,
            always: None,
            context: None,
            cache: None,
            delay_for: None,
            nocache: false,
            build_request: None,
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

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(DataSource::Static(data));
        self
    }

    /// Take data from the host member called `name`.
    pub fn with_data_from(mut self, name: impl Into<String>) -> Self {
        self.data = Some(DataSource::Named(name.into()));
        self
    }

    pub fn with_data_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&H) -> Value + Send + Sync + 'static,
    {
        self.data = Some(DataSource::Inline(Arc::new(f)));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_header(name.into(), HeaderSource::Literal(value.into()));
        self
    }

    pub fn with_computed_header<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.insert_header(name.into(), HeaderSource::Computed(Arc::new(f)));
        self
    }

    /// Take headers from the host member called `name`.
    ///
    /// This replaces any headers added so far.
    pub fn with_headers_from(mut self, name: impl Into<String>) -> Self {
        self.headers = Headers::Named(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_done(mut self, name: impl Into<String>) -> Self {
        self.done = Some(CallbackRef::Named(name.into()));
        self
    }

    pub fn with_fail(mut self, name: impl Into<String>) -> Self {
        self.fail = Some(CallbackRef::Named(name.into()));
        self
    }

    pub fn with_always(mut self, name: impl Into<String>) -> Self {
        self.always = Some(CallbackRef::Named(name.into()));
        self
    }

    pub fn on_done<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, &HttpResponse) + Send + Sync + 'static,
    {
        self.done = Some(CallbackRef::Bound(Arc::new(move |receiver: &H, outcome: &Outcome| {
            if let Ok(response) = outcome {
                f(receiver, response);
            }
        })));
        self
    }

    pub fn on_fail<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, &RequestError) + Send + Sync + 'static,
    {
        self.fail = Some(CallbackRef::Bound(Arc::new(move |receiver: &H, outcome: &Outcome| {
            if let Err(error) = outcome {
                f(receiver, error);
            }
        })));
        self
    }

    pub fn on_always<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, &Outcome) + Send + Sync + 'static,
    {
        self.always = Some(CallbackRef::Bound(Arc::new(f)));
        self
    }

    pub fn with_context(mut self, context: Arc<H>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_cache(mut self, cache: CacheSpec) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_for = Some(delay);
        self
    }

    pub fn with_nocache(mut self, nocache: bool) -> Self {
        self.nocache = nocache;
        self
    }

    pub fn with_request_builder<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, HttpRequest) -> HttpRequest + Send + Sync + 'static,
    {
        self.build_request = Some(Arc::new(f));
        self
    }

    fn insert_header(&mut self, name: String, source: HeaderSource) {
        match &mut self.headers {
            Headers::Map(map) => {
                map.insert(name, source);
            }
            Headers::Named(_) => {
                self.headers = Headers::Map(BTreeMap::from([(name, source)]));
            }
        }
    }
}

impl<H: Host> Descriptor<H> {
    /// Bind every named reference against `host`.
    ///
    /// Missing callbacks resolve to `None` and are logged. A data name that is
    /// not a host member is kept as a literal string value.
    pub fn resolve(&self, host: &H) -> ResolvedDescriptor<H> {
        let data = self.data.as_ref().map(|source| match source {
            DataSource::Static(value) => ResolvedData::Value(value.clone()),
            DataSource::Inline(f) => ResolvedData::Function(Arc::clone(f)),
            DataSource::Named(name) => match host.member(name) {
                Some(HostMember::Data(f)) => ResolvedData::Function(f),
                Some(HostMember::Value(value)) => ResolvedData::Value(value),
                _ => ResolvedData::Value(Value::String(name.clone())),
            },
        });

        let headers = match &self.headers {
            Headers::Map(map) => map.clone(),
            Headers::Named(name) => match host.member(name) {
                Some(HostMember::Value(Value::Object(object))) => object
                    .into_iter()
                    .map(|(key, value)| {
                        let literal = match value {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (key, HeaderSource::Literal(literal))
                    })
                    .collect(),
                _ => {
                    log::warn!("Header member {:?} is not an object; sending no headers", name);
                    BTreeMap::new()
                }
            },
        };

        ResolvedDescriptor {
            url: self.url.clone(),
            method: self.method,
            data,
            headers,
            content_type: self
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            data_type: self
                .data_type
                .clone()
                .unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string()),
            done: resolve_callback(host, "done", self.done.as_ref()),
            fail: resolve_callback(host, "fail", self.fail.as_ref()),
            always: resolve_callback(host, "always", self.always.as_ref()),
            context: self.context.clone(),
            cache: self.cache.clone(),
            delay_for: self.delay_for,
            nocache: self.nocache,
            build_request: self.build_request.clone(),
        }
    }
}

fn resolve_callback<H: Host>(
    host: &H,
    slot: &str,
    reference: Option<&CallbackRef<H>>,
) -> Option<Callback<H>> {
    match reference? {
        CallbackRef::Bound(f) => Some(Arc::clone(f)),
        CallbackRef::Named(name) => match host.member(name) {
            Some(HostMember::Callback(f)) => Some(f),
            _ => {
                log::warn!("{} callback {:?} is not a host callback; ignoring it", slot, name);
                None
            }
        },
    }
}

pub enum ResolvedData<H> {
    Value(Value),
    Function(DataFn<H>),
}

/// A descriptor with every named reference bound.
pub struct ResolvedDescriptor<H> {
    pub url: String,
    pub method: Method,
    pub data: Option<ResolvedData<H>>,
    pub headers: BTreeMap<String, HeaderSource>,
    pub content_type: String,
    pub data_type: String,
    pub done: Option<Callback<H>>,
    pub fail: Option<Callback<H>>,
    pub always: Option<Callback<H>>,
    pub context: Option<Arc<H>>,
    pub cache: Option<CacheSpec>,
    pub delay_for: Option<Duration>,
    pub nocache: bool,
    pub build_request: Option<BuildRequestFn<H>>,
}

impl<H> ResolvedDescriptor<H> {
    /// Evaluate computed headers.
    pub fn header_values(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|(name, source)| (name.clone(), source.value()))
            .collect()
    }

    /// Evaluate the data source against `receiver`.
    pub fn data_value(&self, receiver: &H) -> Value {
        match &self.data {
            Some(ResolvedData::Value(value)) => value.clone(),
            Some(ResolvedData::Function(f)) => f(receiver),
            None => Value::Null,
        }
    }
}

impl<H> Clone for DataSource<H> {
    fn clone(&self) -> Self {
        match self {
            DataSource::Static(value) => DataSource::Static(value.clone()),
            DataSource::Named(name) => DataSource::Named(name.clone()),
            DataSource::Inline(f) => DataSource::Inline(Arc::clone(f)),
        }
    }
}

impl<H> Clone for CallbackRef<H> {
    fn clone(&self) -> Self {
        match self {
            CallbackRef::Named(name) => CallbackRef::Named(name.clone()),
            CallbackRef::Bound(f) => CallbackRef::Bound(Arc::clone(f)),
        }
    }
}

impl<H> Clone for Descriptor<H> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            method: self.method,
            data: self.data.clone(),
            headers: self.headers.clone(),
            content_type: self.content_type.clone(),
            data_type: self.data_type.clone(),
            done: self.done.clone(),
            fail: self.fail.clone(),
            always: self.always.clone(),
            context: self.context.clone(),
            cache: self.cache.clone(),
            delay_for: self.delay_for,
            nocache: self.nocache,
            build_request: self.build_request.clone(),
        }
    }
}

impl<H> std::fmt::Debug for Descriptor<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("cache", &self.cache)
            .field("delay_for", &self.delay_for)
            .field("nocache", &self.nocache)
            .finish_non_exhaustive()
    }
}

impl<H> std::fmt::Debug for ResolvedDescriptor<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDescriptor")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Team {
        id: u64,
        calls: AtomicUsize,
    }

    impl Host for Team {
        fn member(&self, name: &str) -> Option<HostMember<Self>> {
            match name {
                "params" => Some(HostMember::data(|team: &Team| json!({ "id": team.id }))),
                "defaults" => Some(HostMember::Value(json!({ "sort": "asc" }))),
                "authHeaders" => Some(HostMember::Value(json!({ "X-Token": "abc", "X-Retry": 2 }))),
                "onDone" => Some(HostMember::callback(|team: &Team, _| {
                    team.calls.fetch_add(1, Ordering::SeqCst);
                })),
                _ => None,
            }
        }
    }

    fn team() -> Team {
        Team {
            id: 7,
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn named_data_binds_to_host_function() {
        let host = team();
        let resolved = Descriptor::get("/teams/{id}")
            .with_data_from("params")
            .resolve(&host);

        assert!(matches!(resolved.data, Some(ResolvedData::Function(_))));
        assert_eq!(resolved.data_value(&host), json!({ "id": 7 }));
    }

    #[test]
    fn named_data_binds_to_host_value() {
        let host = team();
        let resolved = Descriptor::get("/teams")
            .with_data_from("defaults")
            .resolve(&host);
        assert_eq!(resolved.data_value(&host), json!({ "sort": "asc" }));
    }

    #[test]
    fn unknown_data_name_is_a_literal() {
        let host = team();
        let resolved = Descriptor::post("/teams")
            .with_data_from("raw=payload")
            .resolve(&host);
        assert_eq!(resolved.data_value(&host), json!("raw=payload"));
    }

    #[test]
    fn defaults_are_filled_in() {
        let resolved = Descriptor::get("/teams").resolve(&team());
        assert_eq!(resolved.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(resolved.data_type, DEFAULT_DATA_TYPE);
        assert!(resolved.data.is_none());
        assert_eq!(resolved.data_value(&team()), Value::Null);
    }

    #[test]
    fn headers_literal_and_computed() {
        let resolved = Descriptor::get("/teams")
            .with_header("Accept-Language", "en")
            .with_computed_header("X-Request", || "computed".to_string())
            .resolve(&team());

        let headers = resolved.header_values();
        assert_eq!(headers.get("Accept-Language").map(String::as_str), Some("en"));
        assert_eq!(headers.get("X-Request").map(String::as_str), Some("computed"));
    }

    #[test]
    fn named_headers_come_from_host_object() {
        let resolved = Descriptor::get("/teams")
            .with_headers_from("authHeaders")
            .resolve(&team());

        let headers = resolved.header_values();
        assert_eq!(headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(headers.get("X-Retry").map(String::as_str), Some("2"));
    }

    #[test]
    fn missing_named_headers_resolve_empty() {
        let resolved = Descriptor::get("/teams")
            .with_headers_from("nope")
            .resolve(&team());
        assert!(resolved.headers.is_empty());
    }

    #[test]
    fn named_callbacks_bind_and_missing_ones_are_dropped() {
        let host = team();
        let resolved = Descriptor::get("/teams")
            .with_done("onDone")
            .with_fail("onMissing")
            .resolve(&host);

        assert!(resolved.fail.is_none());
        let done = resolved.done.expect("done should be bound");
        done(&host, &Ok(HttpResponse::ok(json!({}))));
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_done_ignores_failures() {
        let host = team();
        let resolved = Descriptor::get("/teams")
            .on_done(|team: &Team, _| {
                team.calls.fetch_add(1, Ordering::SeqCst);
            })
            .resolve(&host);

        let done = resolved.done.unwrap();
        done(
            &host,
            &Err(RequestError::Transport {
                message: "down".to_string(),
            }),
        );
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn header_after_named_headers_starts_a_new_map() {
        let descriptor: Descriptor<Team> = Descriptor::get("/teams")
            .with_headers_from("authHeaders")
            .with_header("X-Only", "1");
        match descriptor.headers {
            Headers::Map(map) => assert_eq!(map.len(), 1),
            Headers::Named(_) => panic!("expected a header map"),
        }
    }

    #[test]
    fn cache_spec_ttl_and_serde() {
        let spec: CacheSpec =
            serde_json::from_value(json!({ "key": "league", "expiresAfter": 0.5 })).unwrap();
        assert_eq!(spec.store, CacheStoreKind::Memory);
        assert_eq!(spec.ttl(), Some(chrono::Duration::seconds(30)));

        let local: CacheSpec =
            serde_json::from_value(json!({ "key": "k", "expires_after": 2, "store": "local" }))
                .unwrap();
        assert_eq!(local, CacheSpec::local("k", 2.0));
    }

    #[test]
    fn ttl_handles_degenerate_windows() {
        let zero = Some(chrono::Duration::zero());
        assert_eq!(CacheSpec::memory("k", f64::NAN).ttl(), zero);
        assert_eq!(CacheSpec::memory("k", -3.0).ttl(), zero);
        assert_eq!(CacheSpec::memory("k", f64::NEG_INFINITY).ttl(), zero);
        assert_eq!(CacheSpec::memory("k", f64::INFINITY).ttl(), None);
        assert_eq!(CacheSpec::memory("k", f64::MAX).ttl(), None);
        assert_eq!(
            CacheSpec::memory("k", 1e13).ttl(),
            Some(chrono::Duration::minutes(10_000_000_000_000))
        );
    }
}
