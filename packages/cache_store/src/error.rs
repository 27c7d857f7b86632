use std::{io, path};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Root path ({path:?}) is invalid: {error}")]
    RootPathInvalid { path: path::PathBuf, error: io::Error },

    #[error("Invalid key {key:?}: {message}")]
    InvalidKey { key: String, message: String },

    #[error("Store is unavailable: {message}")]
    Unavailable { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
