use std::sync::Arc;

use serde_json::Value;
use sycamore_cache_store::KeyValueStore;
use sycamore_http::{HttpExecutor, RequestHandle};

use crate::cache::{Clock, ResponseCache, SystemClock};
use crate::config::RequesterConfig;
use crate::engine::{RequestEngine, RequestTarget};
use crate::error::Error;
use crate::host::Host;
use crate::template::{Evaluator, Template};

/// A host paired with the engine that executes its requests.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use sycamore_http::ReqwestExecutor;
/// use sycamore_requester::{Descriptor, Host, RequestMap, Requester};
///
/// struct Scoreboard;
///
/// impl Host for Scoreboard {
///     fn requests(&self) -> RequestMap<Self> {
///         RequestMap::from([(
///             "matchup".to_string(),
///             Descriptor::get("http://example.com/league/12345/matchup/{id}/stats"),
///         )])
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let requester = Requester::new(Scoreboard, Arc::new(ReqwestExecutor::with_default_timeout()?))?;
/// let outcome = requester
///     .execute("matchup", Some(json!({ "id": 10017, "sort": "desc" })))?
///     .wait();
/// # let _ = outcome;
/// # Ok(())
/// # }
/// ```
pub struct Requester<H> {
    host: Arc<H>,
    engine: RequestEngine<H>,
}

impl<H: Host> Requester<H> {
    /// A requester with the default configuration and an in-memory cache.
    pub fn new(host: H, executor: Arc<dyn HttpExecutor>) -> Result<Self, Error> {
        RequesterBuilder::new(host, executor).build()
    }

    pub fn builder(host: H, executor: Arc<dyn HttpExecutor>) -> RequesterBuilder<H> {
        RequesterBuilder::new(host, executor)
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn engine(&self) -> &RequestEngine<H> {
        &self.engine
    }

    /// Execute a named request or a one-off descriptor.
    ///
    /// `data`, when given, is combined with the descriptor's own data
    /// according to the configured merge mode.
    pub fn execute(
        &self,
        target: impl Into<RequestTarget<H>>,
        data: Option<Value>,
    ) -> Result<RequestHandle, Error> {
        self.engine.execute(&self.host, target.into(), data)
    }

    pub fn fetch(&self, target: impl Into<RequestTarget<H>>) -> Result<RequestHandle, Error> {
        self.execute(target, None)
    }

    /// Names of the host's declared requests.
    pub fn request_names(&self) -> Vec<String> {
        self.engine.registry().names(&self.host)
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.registry().is_initialized()
    }

    /// A callable bound to one declared request.
    pub fn shortcut(&self, name: &str) -> Result<Shortcut<'_, H>, Error> {
        if self.engine.registry().get(&self.host, name).is_none() {
            return Err(Error::UnknownRequest {
                name: name.to_string(),
            });
        }
        Ok(Shortcut {
            requester: self,
            name: name.to_string(),
        })
    }

    /// One shortcut per declared request, in name order.
    pub fn shortcuts(&self) -> Vec<Shortcut<'_, H>> {
        self.request_names()
            .into_iter()
            .map(|name| Shortcut {
                requester: self,
                name,
            })
            .collect()
    }
}

impl<H> std::fmt::Debug for Requester<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Forwards to [`Requester::execute`] for a single declared request.
pub struct Shortcut<'a, H> {
    requester: &'a Requester<H>,
    name: String,
}

impl<'a, H: Host> Shortcut<'a, H> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, data: Option<Value>) -> Result<RequestHandle, Error> {
        self.requester.execute(self.name.as_str(), data)
    }
}

/// Gives any type that holds a [`Requester`] `execute` and `fetch`.
pub trait Execute<H: Host> {
    fn requester(&self) -> &Requester<H>;

    fn execute(
        &self,
        target: impl Into<RequestTarget<H>>,
        data: Option<Value>,
    ) -> Result<RequestHandle, Error> {
        self.requester().execute(target, data)
    }

    fn fetch(&self, target: impl Into<RequestTarget<H>>) -> Result<RequestHandle, Error> {
        self.requester().fetch(target)
    }
}

impl<H: Host> Execute<H> for Requester<H> {
    fn requester(&self) -> &Requester<H> {
        self
    }
}

pub struct RequesterBuilder<H> {
    host: H,
    executor: Arc<dyn HttpExecutor>,
    config: RequesterConfig,
    local_store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    evaluator: Option<Evaluator>,
}

impl<H: Host> RequesterBuilder<H> {
    pub fn new(host: H, executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            host,
            executor,
            config: RequesterConfig::default(),
            local_store: None,
            clock: Arc::new(SystemClock),
            evaluator: None,
        }
    }

    pub fn config(mut self, config: RequesterConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistent store backing `local` cache entries.
    pub fn local_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.local_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable evaluate blocks in URL templates.
    pub fn evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn build(self) -> Result<Requester<H>, Error> {
        self.config.validate()?;

        let template = match self.evaluator {
            Some(evaluator) => Template::with_evaluator(&self.config.template, evaluator)?,
            None => Template::compile(&self.config.template)?,
        };
        let cache = ResponseCache::new(
            self.config.cache_namespace.clone(),
            self.local_store,
            self.clock,
        );

        Ok(Requester {
            host: Arc::new(self.host),
            engine: RequestEngine::new(self.config, template, cache, self.executor),
        })
    }
}
