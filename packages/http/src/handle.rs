//! Promise-like handles for dispatched requests.
//!
//! A [`RequestHandle`] starts out pending and is settled exactly once with an
//! [`Outcome`]. Listeners registered through `done`, `fail`, and `always` run in
//! registration order when the handle settles, or immediately if it already
//! has. Callers that prefer blocking can `wait` on the handle instead.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::types::HttpResponse;

/// Final result of a request.
pub type Outcome = Result<HttpResponse, RequestError>;

type Listener = Box<dyn FnOnce(&Outcome) + Send>;

/// The state of a request handle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Request is in progress
    Pending,
    /// Request completed successfully
    Complete,
    /// Request failed with an error
    Failed,
}

/// Snapshot of a handle's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatus {
    /// Identifier assigned by the engine that created the handle
    pub id: String,

    /// Current state of the request
    pub state: RequestState,

    /// Error message if state is Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestStatus {
    pub fn pending(id: String) -> Self {
        Self {
            id,
            state: RequestState::Pending,
            error: None,
        }
    }

    pub fn complete(id: String) -> Self {
        Self {
            id,
            state: RequestState::Complete,
            error: None,
        }
    }

    pub fn failed(id: String, error: String) -> Self {
        Self {
            id,
            state: RequestState::Failed,
            error: Some(error),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }

    pub fn is_complete(&self) -> bool {
        self.state == RequestState::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.state == RequestState::Failed
    }
}

struct HandleState {
    status: RequestStatus,
    outcome: Option<Outcome>,
    listeners: Vec<Listener>,
}

struct SharedHandle {
    state: Mutex<HandleState>,
    settled: Condvar,
}

impl SharedHandle {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle onto a single request's eventual outcome.
#[derive(Clone)]
pub struct RequestHandle {
    shared: Arc<SharedHandle>,
}

impl RequestHandle {
    /// A handle that settles later via [`settle`](Self::settle).
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SharedHandle {
                state: Mutex::new(HandleState {
                    status: RequestStatus::pending(id.into()),
                    outcome: None,
                    listeners: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// A handle that is already resolved with `response`.
    pub fn resolved(id: impl Into<String>, response: HttpResponse) -> Self {
        let handle = Self::pending(id);
        handle.settle(Ok(response));
        handle
    }

    /// A handle that is already rejected with `error`.
    pub fn rejected(id: impl Into<String>, error: RequestError) -> Self {
        let handle = Self::pending(id);
        handle.settle(Err(error));
        handle
    }

    pub fn id(&self) -> String {
        self.shared.lock().status.id.clone()
    }

    pub fn status(&self) -> RequestStatus {
        self.shared.lock().status.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().status.is_pending()
    }

    /// Settle the handle and run queued listeners.
    ///
    /// Returns `false` (and does nothing) if the handle was already settled.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let listeners = {
            let mut state = self.shared.lock();
            if state.outcome.is_some() {
                return false;
            }
            let id = state.status.id.clone();
            state.status = match &outcome {
                Ok(_) => RequestStatus::complete(id),
                Err(error) => RequestStatus::failed(id, error.to_string()),
            };
            state.outcome = Some(outcome.clone());
            self.shared.settled.notify_all();
            std::mem::take(&mut state.listeners)
        };

        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    pub fn resolve(&self, response: HttpResponse) -> bool {
        self.settle(Ok(response))
    }

    pub fn reject(&self, error: RequestError) -> bool {
        self.settle(Err(error))
    }

    /// Register a listener for either outcome.
    pub fn always<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let settled = {
            let mut state = self.shared.lock();
            match &state.outcome {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    state.listeners.push(Box::new(listener));
                    return self;
                }
            }
        };

        if let Some(outcome) = settled {
            listener(&outcome);
        }
        self
    }

    /// Register a listener for a successful outcome.
    pub fn done<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(&HttpResponse) + Send + 'static,
    {
        self.always(move |outcome| {
            if let Ok(response) = outcome {
                listener(response);
            }
        })
    }

    /// Register a listener for a failed outcome.
    pub fn fail<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(&RequestError) + Send + 'static,
    {
        self.always(move |outcome| {
            if let Err(error) = outcome {
                listener(error);
            }
        })
    }

    /// Block until the handle settles.
    pub fn wait(&self) -> Outcome {
        let mut state = self.shared.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            state = self
                .shared
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the handle settles or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .settled
            .wait_timeout_while(state, timeout, |state| state.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.outcome.clone()
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("status", &self.status())
            .finish()
    }
}
