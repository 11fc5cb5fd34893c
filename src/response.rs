//! Inspection of raw origin responses.

const HEAD_END: &[u8; 4] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine<'a> {
    pub version: &'a str,
    pub code: u16,
    pub reason: &'a str,
}

impl<'a> StatusLine<'a> {
    /// Parses `HTTP/x.y CODE REASON` from the first line of `resp`.
    pub fn parse(resp: &'a [u8]) -> Option<Self> {
        let end = resp
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(resp.len());
        let line = std::str::from_utf8(&resp[..end]).ok()?;

        let mut parts = line.splitn(3, ' ');
        let version = parts.next().filter(|v| v.starts_with("HTTP/"))?;
        let code = parts.next().filter(|c| c.len() == 3)?.parse().ok()?;
        let reason = parts.next().unwrap_or_default();

        Some(Self {
            version,
            code,
            reason,
        })
    }

    pub fn is_not_modified(&self) -> bool {
        self.code == 304 && self.reason == "Not Modified"
    }
}

/// Raw text after `Last-Modified:` in the response head. `None` when the
/// header is missing or blank.
pub fn last_modified(resp: &[u8]) -> Option<String> {
    let head_len = resp
        .windows(HEAD_END.len())
        .position(|w| w == HEAD_END)
        .unwrap_or(resp.len());
    let head = String::from_utf8_lossy(&resp[..head_len]);

    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| name.eq_ignore_ascii_case("Last-Modified"))
        .map(|(_, value)| value)
        .last()
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}
