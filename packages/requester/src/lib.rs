//! # sycamore-requester
//!
//! Declarative HTTP requests. A [`Host`] declares named [`Descriptor`]s (URL
//! template, method, data source, headers, callbacks, cache policy, delay);
//! a [`Requester`] resolves them once and turns each `execute` call into a
//! dispatched request.
//!
//! ```text
//! execute(target, data)
//!   -> registry (named targets, resolved on first use)
//!   -> cache lookup            (hit: resolved handle, no callbacks)
//!   -> headers, data, URL tokens, payload encoding
//!   -> background dispatch     (after `delay_for`, if set)
//!   -> cache write, done | fail, always, handle settles
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use sycamore_http::{HttpResponse, MockExecutor};
//! use sycamore_requester::{CacheSpec, Descriptor, Host, RequestMap, Requester};
//!
//! struct League;
//!
//! impl Host for League {
//!     fn requests(&self) -> RequestMap<Self> {
//!         RequestMap::from([(
//!             "details".to_string(),
//!             Descriptor::get("http://example.com/leagues/{id}")
//!                 .with_cache(CacheSpec::memory("league", 5.0)),
//!         )])
//!     }
//! }
//!
//! let executor = Arc::new(
//!     MockExecutor::new().with_response(
//!         "http://example.com/leagues/98765",
//!         HttpResponse::ok(json!({ "name": "Sycamore League" })),
//!     ),
//! );
//! let requester = Requester::new(League, executor.clone()).unwrap();
//!
//! let response = requester
//!     .execute("details", Some(json!({ "id": 98765 })))
//!     .unwrap()
//!     .wait()
//!     .unwrap();
//! assert_eq!(response.body["name"], "Sycamore League");
//! ```

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod host;
pub mod registry;
pub mod requester;
pub mod template;

pub use cache::{Clock, ManualClock, ResponseCache, SystemClock};
pub use config::{DataMerge, PreserveUrlTokens, RequesterConfig, TemplateSettings};
pub use descriptor::{
    BuildRequestFn, CacheSpec, CacheStoreKind, CallbackRef, DataSource, Descriptor, HeaderFn,
    HeaderSource, Headers, ResolvedData, ResolvedDescriptor,
};
pub use engine::{RequestEngine, RequestTarget};
pub use error::Error;
pub use host::{Callback, DataFn, Host, HostMember, RequestMap};
pub use registry::Registry;
pub use requester::{Execute, Requester, RequesterBuilder, Shortcut};
pub use template::{Evaluator, Template};
