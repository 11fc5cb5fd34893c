use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProxyError;

pub const REQ_END: &[u8; 4] = b"\r\n\r\n";
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

const READ_BUFFER: usize = 4096;

/// A validated client request. `headers` holds every retained header line,
/// each ending in CRLF, followed by the terminating blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: String,
}

/// Reads from the client until the end of the request head.
/// Bytes after the terminator are ignored; no request body is read.
pub async fn read_head<R>(reader: &mut R) -> Result<Vec<u8>, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(READ_BUFFER);
    let mut buf = [0u8; READ_BUFFER];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(ProxyError::ClientClosed);
        }

        // The terminator may straddle two reads.
        let search_from = head.len().saturating_sub(REQ_END.len() - 1);
        head.extend_from_slice(&buf[..n]);

        if let Some(pos) = find(&head[search_from..], REQ_END) {
            head.truncate(search_from + pos + REQ_END.len());
            return Ok(head);
        }

        if head.len() > MAX_REQUEST_SIZE {
            return Err(ProxyError::RequestTooLarge(MAX_REQUEST_SIZE));
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl ParsedRequest {
    pub fn parse(head: &[u8]) -> Result<Self, ProxyError> {
        let text = String::from_utf8_lossy(head);
        let text = text.strip_suffix("\r\n\r\n").unwrap_or(&text);
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let (method, uri, version) = parse_request_line(request_line)?;
        let headers = parse_headers(lines)?;

        Ok(Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
        })
    }
}

fn parse_request_line(line: &str) -> Result<(&str, &str, &str), ProxyError> {
    let malformed = || ProxyError::MalformedRequestLine(line.to_string());

    let parts: Vec<&str> = line.split(' ').collect();
    let [method, uri, version] = parts[..] else {
        return Err(malformed());
    };

    if method != "GET" {
        return Err(ProxyError::UnsupportedMethod(method.to_string()));
    }

    match version.split('/').collect::<Vec<_>>()[..] {
        ["HTTP", v] if v.starts_with("1.0") => {}
        _ => return Err(malformed()),
    }

    let segments: Vec<&str> = uri.split('/').collect();
    if segments.len() < 4 || segments[0] != "http:" || !segments[1].is_empty() {
        return Err(malformed());
    }
    if segments[2].is_empty() {
        return Err(malformed());
    }

    Ok((method, uri, version))
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<String, ProxyError> {
    let mut headers = String::new();

    for line in lines {
        let mut tokens = line.split(' ');
        let name = tokens.next().unwrap_or_default();
        if tokens.next().is_none() || !name.ends_with(':') {
            return Err(ProxyError::MalformedHeaders(line.to_string()));
        }
        if name == "Connection:" {
            continue;
        }
        headers.push_str(line);
        headers.push_str("\r\n");
    }

    headers.push_str("\r\n");
    Ok(headers)
}
