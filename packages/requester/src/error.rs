use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A delimiter pattern could not be compiled into a matcher.
    ///
    /// `source_text` holds the combined pattern the matcher was built from.
    #[error("Template compile error: {message}")]
    TemplateCompile {
        message: String,
        source_text: String,
    },

    #[error("Unknown request: {name}")]
    UnknownRequest { name: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
