use std::net::Ipv4Addr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("malformed request: {0:?}")]
    MalformedRequest(String),

    #[error("host not found: {0}")]
    HostNotFound(Ipv4Addr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
