use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),

    #[error("capture source error: {0}")]
    Source(String),

    #[error("too many headers (limit {limit})")]
    TooManyHeaders { limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
