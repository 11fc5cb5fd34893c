use std::io;

use thiserror::Error;

pub const RESPONSE_200: &[u8] = b"HTTP/1.0 200 OK\r\n\r\n";
pub const RESPONSE_400: &[u8] = b"HTTP/1.0 400 Bad Request\r\n\r\n";
pub const RESPONSE_403: &[u8] = b"HTTP/1.0 403 Forbidden\r\n\r\n";
pub const RESPONSE_501: &[u8] = b"HTTP/1.0 501 Not Implemented\r\n\r\n";
pub const RESPONSE_502: &[u8] = b"HTTP/1.0 502 Bad Gateway\r\n\r\n";

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("malformed request line: {0}")]
    MalformedRequestLine(String),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("malformed header line: {0}")]
    MalformedHeaders(String),
    #[error("request head exceeds {0} bytes")]
    RequestTooLarge(usize),
    #[error("blocked domain: {0}")]
    BlockedDomain(String),
    #[error("host not in block list: {0}")]
    NotBlocked(String),
    #[error("failed to connect to {host}:{port}: {source}")]
    UpstreamConnect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("upstream IO error: {0}")]
    UpstreamIo(#[source] io::Error),
    #[error("client closed connection before end of request")]
    ClientClosed,
    #[error("client IO error: {0}")]
    ClientIo(#[from] io::Error),
}

impl ProxyError {
    /// Status line written to the client for this failure, if any.
    pub fn status_line(&self) -> Option<&'static [u8]> {
        match self {
            ProxyError::MalformedRequestLine(_)
            | ProxyError::MalformedHeaders(_)
            | ProxyError::RequestTooLarge(_) => Some(RESPONSE_400),
            ProxyError::UnsupportedMethod(_) => Some(RESPONSE_501),
            ProxyError::BlockedDomain(_) => Some(RESPONSE_403),
            ProxyError::UpstreamConnect { .. } | ProxyError::UpstreamIo(_) => Some(RESPONSE_502),
            ProxyError::NotBlocked(_) | ProxyError::ClientClosed | ProxyError::ClientIo(_) => None,
        }
    }
}
