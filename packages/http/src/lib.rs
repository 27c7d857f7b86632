//! # sycamore-http
//!
//! Transport layer for sycamore.
//!
//! This crate defines the plain-data request/response types the requester
//! produces, the [`HttpExecutor`] capability that performs the round-trip,
//! and [`RequestHandle`], the promise-like value callers use to observe a
//! request's outcome.
//!
//! ```ignore
//! use sycamore_http::{HttpExecutor, HttpRequest, ReqwestExecutor};
//!
//! let executor = ReqwestExecutor::with_default_timeout()?;
//! let response = executor.execute(&HttpRequest::get("https://example.com/leagues"))?;
//! ```
//!
//! Enable the `test-utils` feature for [`MockExecutor`](executor::mock::MockExecutor).

pub mod error;
pub mod executor;
pub mod handle;
pub mod types;

pub use error::{Error, RequestError};
pub use executor::{HttpExecutor, ReqwestExecutor};
pub use handle::{Outcome, RequestHandle, RequestState, RequestStatus};
pub use types::{
    HttpRequest, HttpResponse, Method, Payload, DEFAULT_CONTENT_TYPE, DEFAULT_DATA_TYPE,
};

#[cfg(any(test, feature = "test-utils"))]
pub use executor::mock::MockExecutor;
