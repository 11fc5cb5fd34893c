use std::fmt;

use crate::error::ProxyError;

pub const DEFAULT_PORT: u16 = 80;

const SCHEME: &str = "http://";
const BLOCKLIST_ADD: &str = "/proxy/blocklist/add/";
const BLOCKLIST_REMOVE: &str = "/proxy/blocklist/remove/";

/// Administrative commands reachable through reserved request paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    EnableCache,
    DisableCache,
    FlushCache,
    EnableBlocklist,
    DisableBlocklist,
    FlushBlocklist,
    Block(String),
    Unblock(String),
}

impl ControlCommand {
    fn from_path(path: &str) -> Option<Self> {
        let cmd = match path {
            "/proxy/cache/enable" => Self::EnableCache,
            "/proxy/cache/disable" => Self::DisableCache,
            "/proxy/cache/flush" => Self::FlushCache,
            "/proxy/blocklist/enable" => Self::EnableBlocklist,
            "/proxy/blocklist/disable" => Self::DisableBlocklist,
            "/proxy/blocklist/flush" => Self::FlushBlocklist,
            _ => {
                if let Some(host) = path.strip_prefix(BLOCKLIST_ADD).filter(|h| !h.is_empty()) {
                    Self::Block(host.to_string())
                } else if let Some(host) =
                    path.strip_prefix(BLOCKLIST_REMOVE).filter(|h| !h.is_empty())
                {
                    Self::Unblock(host.to_string())
                } else {
                    return None;
                }
            }
        };
        Some(cmd)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableCache => f.write_str("cache enable"),
            Self::DisableCache => f.write_str("cache disable"),
            Self::FlushCache => f.write_str("cache flush"),
            Self::EnableBlocklist => f.write_str("blocklist enable"),
            Self::DisableBlocklist => f.write_str("blocklist disable"),
            Self::FlushBlocklist => f.write_str("blocklist flush"),
            Self::Block(host) => write!(f, "blocklist add {}", host),
            Self::Unblock(host) => write!(f, "blocklist remove {}", host),
        }
    }
}

/// An origin to forward to, with the request preamble sent to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ProxyTarget {
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.host, self.path)
    }

    /// `GET`, `Host` and `Connection: close` lines, each CRLF-terminated.
    pub fn request_line(&self) -> String {
        format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n",
            self.path, self.host
        )
    }

    /// Full upstream request: preamble, retained client headers, blank line.
    pub fn full_request(&self, headers: &str) -> Vec<u8> {
        let mut req = self.request_line();
        req.push_str(headers);
        req.into_bytes()
    }

    pub fn conditional_request(&self, last_modified: &str) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\nIf-Modified-Since:{}\r\nConnection: close\r\n\r\n",
            self.path, self.host, last_modified
        )
        .into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Control(ControlCommand),
    Proxy(ProxyTarget),
}

impl Route {
    /// Classifies an already validated `http://` request URI.
    pub fn from_uri(uri: &str) -> Result<Self, ProxyError> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| ProxyError::MalformedRequestLine(uri.to_string()))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        if let Some(cmd) = ControlCommand::from_path(path) {
            return Ok(Route::Control(cmd));
        }

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ProxyError::MalformedRequestLine(uri.to_string()))?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(ProxyError::MalformedRequestLine(uri.to_string()));
        }

        Ok(Route::Proxy(ProxyTarget {
            host: host.to_string(),
            port,
            path: path.to_string(),
        }))
    }
}
