use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
const BUFFER_SIZE: usize = 256 * 1024;

/// A host is blocked when it equals an entry, contains one, or is contained
/// in one. `example` therefore blocks `www.example.com`, and `www.example.com`
/// blocks `example`.
pub fn is_blocked(host: &str, blocked: &HashSet<String>) -> bool {
    if blocked.contains(host) {
        return true;
    }
    blocked
        .iter()
        .any(|entry| host.contains(entry.as_str()) || entry.contains(host))
}

/// Reads block-list entries from a file, one host per line.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for blocklist file: {:?}", path))?;

    if metadata.len() > MAX_FILE_SIZE {
        anyhow::bail!("blocklist file too large");
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open blocklist file: {:?}", path))?;
    let reader = BufReader::with_capacity(BUFFER_SIZE, file);

    let mut entries = Vec::new();
    let mut raw_count = 0;

    for line in reader.lines() {
        let line = line?;
        raw_count += 1;
        if let Some(host) = parse_line(&line) {
            entries.push(host.to_string());
        }
    }

    tracing::info!(
        "Loaded blocklist: {} entries from {} lines",
        entries.len(),
        raw_count
    );

    Ok(entries)
}

fn parse_line(line: &str) -> Option<&str> {
    let mut host = line.trim();

    if host.is_empty() || host.starts_with('#') || host.starts_with("//") {
        return None;
    }

    for scheme in ["https://", "http://"] {
        if let Some(rest) = host.strip_prefix(scheme) {
            host = rest;
            break;
        }
    }

    if let Some(idx) = host.find(&['/', ':', '?', '#'][..]) {
        host = &host[..idx];
    }

    host.split_whitespace().next()
}
