//! The object that owns named requests and the members they refer to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use sycamore_http::Outcome;

use crate::descriptor::Descriptor;

/// Produces request data at call time from the receiver.
pub type DataFn<H> = Arc<dyn Fn(&H) -> Value + Send + Sync>;

/// A completion callback. It receives the receiver and the request outcome.
pub type Callback<H> = Arc<dyn Fn(&H, &Outcome) + Send + Sync>;

/// Named request declarations, keyed by request name.
pub type RequestMap<H> = BTreeMap<String, Descriptor<H>>;

/// A member a descriptor may reference by name.
pub enum HostMember<H> {
    /// A method producing request data.
    Data(DataFn<H>),
    /// A method usable as a `done`, `fail` or `always` callback.
    Callback(Callback<H>),
    /// A plain value, used as static data or as a header map.
    Value(Value),
}

impl<H> HostMember<H> {
    pub fn data<F>(f: F) -> Self
    where
        F: Fn(&H) -> Value + Send + Sync + 'static,
    {
        HostMember::Data(Arc::new(f))
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&H, &Outcome) + Send + Sync + 'static,
    {
        HostMember::Callback(Arc::new(f))
    }
}

impl<H> Clone for HostMember<H> {
    fn clone(&self) -> Self {
        match self {
            HostMember::Data(f) => HostMember::Data(Arc::clone(f)),
            HostMember::Callback(f) => HostMember::Callback(Arc::clone(f)),
            HostMember::Value(v) => HostMember::Value(v.clone()),
        }
    }
}

impl<H> std::fmt::Debug for HostMember<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostMember::Data(_) => f.write_str("HostMember::Data(..)"),
            HostMember::Callback(_) => f.write_str("HostMember::Callback(..)"),
            HostMember::Value(v) => f.debug_tuple("HostMember::Value").field(v).finish(),
        }
    }
}

/// A type that declares named requests for a [`Requester`](crate::Requester).
///
/// Both methods have empty defaults, so a host with nothing to declare is just
/// `impl Host for MyType {}`.
///
/// ```rust
/// use serde_json::json;
/// use sycamore_requester::{Descriptor, Host, HostMember, RequestMap};
///
/// struct League {
///     id: u64,
/// }
///
/// impl Host for League {
///     fn requests(&self) -> RequestMap<Self> {
///         let mut requests = RequestMap::new();
///         requests.insert(
///             "details".to_string(),
///             Descriptor::get("http://example.com/leagues/{id}").with_data_from("params"),
///         );
///         requests
///     }
///
///     fn member(&self, name: &str) -> Option<HostMember<Self>> {
///         match name {
///             "params" => Some(HostMember::data(|league: &League| json!({ "id": league.id }))),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Host: Send + Sync + Sized + 'static {
    /// Declared requests. Called once per requester, on first use.
    fn requests(&self) -> RequestMap<Self> {
        RequestMap::new()
    }

    /// Look up a member referenced by name from a descriptor.
    fn member(&self, name: &str) -> Option<HostMember<Self>> {
        let _ = name;
        None
    }
}
