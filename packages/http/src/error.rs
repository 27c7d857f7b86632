use serde::{Deserialize, Serialize};

/// Errors raised while talking to the transport.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport failure: {message}")]
    Transport { message: String },
}

/// Why a dispatched request did not succeed.
///
/// This is what `fail` and `always` callbacks observe, and what a rejected
/// [`RequestHandle`](crate::RequestHandle) carries. It is `Clone` because a
/// single outcome fans out to every registered listener.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestError {
    /// The executor could not complete the round-trip.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        body: String,
    },
}

impl From<Error> for RequestError {
    fn from(error: Error) -> Self {
        RequestError::Transport {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_converts_to_request_error() {
        let error = Error::Transport {
            message: "connection refused".to_string(),
        };
        let converted = RequestError::from(error);
        assert_eq!(
            converted,
            RequestError::Transport {
                message: "Transport failure: connection refused".to_string()
            }
        );
    }

    #[test]
    fn status_error_display() {
        let error = RequestError::Status {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            body: String::new(),
        };
        assert_eq!(error.to_string(), "HTTP 503 Service Unavailable");
    }
}
