//! Turns descriptors into dispatched requests.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::{Map, Value};
use sycamore_http::{
    HttpExecutor, HttpRequest, Method, Outcome, Payload, RequestError, RequestHandle,
};

use crate::cache::ResponseCache;
use crate::config::{DataMerge, RequesterConfig};
use crate::descriptor::{Descriptor, ResolvedDescriptor};
use crate::error::Error;
use crate::host::{Callback, Host};
use crate::registry::Registry;
use crate::template::Template;

/// What to execute: a request declared by the host, or a one-off descriptor.
pub enum RequestTarget<H> {
    Named(String),
    Descriptor(Descriptor<H>),
}

impl<H> From<&str> for RequestTarget<H> {
    fn from(name: &str) -> Self {
        RequestTarget::Named(name.to_string())
    }
}

impl<H> From<String> for RequestTarget<H> {
    fn from(name: String) -> Self {
        RequestTarget::Named(name)
    }
}

impl<H> From<Descriptor<H>> for RequestTarget<H> {
    fn from(descriptor: Descriptor<H>) -> Self {
        RequestTarget::Descriptor(descriptor)
    }
}

pub struct RequestEngine<H> {
    config: RequesterConfig,
    template: Template,
    registry: Registry<H>,
    cache: Arc<ResponseCache>,
    executor: Arc<dyn HttpExecutor>,
    next_request_id: AtomicU64,
}

impl<H: Host> RequestEngine<H> {
    pub fn new(
        config: RequesterConfig,
        template: Template,
        cache: ResponseCache,
        executor: Arc<dyn HttpExecutor>,
    ) -> Self {
        Self {
            config,
            template,
            registry: Registry::new(),
            cache: Arc::new(cache),
            executor,
            next_request_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RequesterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<H> {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Execute `target` on behalf of `host`.
    ///
    /// Only an unknown request name fails synchronously. Transport problems
    /// are reported through the returned handle and the descriptor's
    /// callbacks.
    pub fn execute(
        &self,
        host: &Arc<H>,
        target: RequestTarget<H>,
        data: Option<Value>,
    ) -> Result<RequestHandle, Error> {
        let resolved = match target {
            RequestTarget::Named(name) => self
                .registry
                .get(host, &name)
                .ok_or(Error::UnknownRequest { name })?,
            RequestTarget::Descriptor(descriptor) => Arc::new(descriptor.resolve(host)),
        };

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed).to_string();

        if let Some(spec) = &resolved.cache {
            if let Some(response) = self.cache.lookup(spec) {
                log::debug!("Cache hit for {:?}", spec.key);
                return Ok(RequestHandle::resolved(id, response));
            }
        }

        let receiver = resolved
            .context
            .clone()
            .unwrap_or_else(|| Arc::clone(host));
        let request = self.prepare(&resolved, &receiver, data);

        let handle = RequestHandle::pending(id);
        self.dispatch(resolved, receiver, request, handle.clone());
        Ok(handle)
    }

    /// Build the transport request for `resolved` without sending it.
    pub fn prepare(
        &self,
        resolved: &ResolvedDescriptor<H>,
        receiver: &H,
        data: Option<Value>,
    ) -> HttpRequest {
        let resolved_data = resolved.data_value(receiver);
        let mut payload = match data {
            Some(data) => merge_data(self.config.data_merge, resolved_data, data),
            None => resolved_data,
        };

        let url = self.render_url(&resolved.url, resolved.method, &mut payload);

        let request = HttpRequest {
            url,
            method: resolved.method,
            headers: resolved.header_values(),
            data: encode_payload(resolved.method, &resolved.content_type, payload),
            data_type: resolved.data_type.clone(),
            content_type: resolved.content_type.clone(),
            cache_bust: resolved.method == Method::GET && resolved.nocache,
        };

        match &resolved.build_request {
            Some(build) => build(receiver, request),
            None => request,
        }
    }

    /// Substitute URL tokens from `payload`, removing consumed tokens from it
    /// unless the method preserves them.
    fn render_url(&self, url: &str, method: Method, payload: &mut Value) -> String {
        let Value::Object(fields) = payload else {
            return url.to_string();
        };
        if fields.is_empty() || !self.template.has_placeholders(url) {
            return url.to_string();
        }

        let values: Map<String, Value> = fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_strings(value)))
            .collect();

        let rendered = self.template.render(url, &values);

        if !self
            .config
            .preserve_url_tokens_in_payload
            .preserves(method)
        {
            for token in self.template.tokens(url) {
                fields.remove(&token);
            }
        }

        rendered
    }

    fn dispatch(
        &self,
        resolved: Arc<ResolvedDescriptor<H>>,
        receiver: Arc<H>,
        request: HttpRequest,
        handle: RequestHandle,
    ) {
        let executor = Arc::clone(&self.executor);
        let cache = Arc::clone(&self.cache);

        thread::spawn(move || {
            if let Some(delay) = resolved.delay_for {
                log::debug!("Delaying {} {} by {:?}", request.method, request.url, delay);
                thread::sleep(delay);
            }

            log::debug!("Dispatching {} {}", request.method, request.url);
            let outcome: Outcome = match executor.execute(&request) {
                Ok(response) if response.is_success() => Ok(response),
                Ok(response) => Err(RequestError::Status {
                    status: response.status,
                    status_text: response.status_text,
                    body: response
                        .body_text
                        .unwrap_or_else(|| response.body.to_string()),
                }),
                Err(error) => Err(RequestError::from(error)),
            };

            match &outcome {
                Ok(response) => {
                    if let Some(spec) = &resolved.cache {
                        cache.store(spec, response);
                    }
                    invoke("done", resolved.done.as_ref(), &*receiver, &outcome);
                }
                Err(error) => {
                    log::warn!("{} {} failed: {}", request.method, request.url, error);
                    invoke("fail", resolved.fail.as_ref(), &*receiver, &outcome);
                }
            }
            invoke("always", resolved.always.as_ref(), &*receiver, &outcome);

            handle.settle(outcome);
        });
    }
}

/// Run a user callback. A panic is logged and swallowed so the handle still
/// settles and later callbacks still run.
fn invoke<H>(stage: &str, callback: Option<&Callback<H>>, receiver: &H, outcome: &Outcome) {
    let Some(callback) = callback else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(receiver, outcome))).is_err() {
        log::error!("The {} callback panicked", stage);
    }
}

fn merge_data(mode: DataMerge, base: Value, data: Value) -> Value {
    match (mode, base, data) {
        (DataMerge::Merge, Value::Object(mut base), Value::Object(data)) => {
            base.extend(data);
            Value::Object(base)
        }
        (DataMerge::Merge, base, Value::Null) => base,
        (_, _, data) => data,
    }
}

/// Percent-encode every string in `value`, including those nested in objects
/// and arrays that dotted URL tokens can reach.
fn encode_strings(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(urlencoding::encode(s).into_owned()),
        Value::Array(items) => Value::Array(items.iter().map(encode_strings).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), encode_strings(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type.is_empty() || content_type.to_ascii_lowercase().contains("json")
}

fn encode_payload(method: Method, content_type: &str, data: Value) -> Option<Payload> {
    match data {
        Value::Null => None,
        Value::String(text) => Some(Payload::Text(text)),
        data if method.has_body() && is_json_content_type(content_type) => {
            Some(Payload::Text(data.to_string()))
        }
        data => Some(Payload::Value(data)),
    }
}

impl<H> std::fmt::Debug for RequestEngine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEngine")
            .field("config", &self.config)
            .field("template", &self.template)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
