//! Master flag list from the community client tracker.
//!
//! The tracker publishes a newline-delimited catalog of known flag names
//! across all applications, each line of the form `[<tag>] <name>`. Retained
//! names get a type-appropriate placeholder default so they can fill gaps in
//! per-application data.

use indexmap::IndexMap;
use url::Url;

use crate::transport::{Transport, TransportError};

const BOOL_PREFIXES: &[&str] = &["FFlag", "DFFlag", "SFFlag"];
const INT_PREFIXES: &[&str] = &["FInt", "DFInt"];
const STRING_PREFIXES: &[&str] = &["FString", "DFString"];

/// Names carrying this prefix are the only ones promoted into typed `Flag`
/// records; everything else stays in the raw merged map.
pub const PRIMARY_BOOL_PREFIX: &str = "DFFlag";

fn default_value(name: &str) -> Option<&'static str> {
    if INT_PREFIXES.iter().any(|p| name.starts_with(p)) {
        Some("0")
    } else if STRING_PREFIXES.iter().any(|p| name.starts_with(p)) {
        Some("")
    } else if BOOL_PREFIXES.iter().any(|p| name.starts_with(p)) {
        Some("false")
    } else {
        None
    }
}

/// Parses the tracker's variable list. Blank lines, comments and lines
/// without a recognized prefix are dropped; duplicate names collapse to one
/// entry, last write wins.
pub fn parse_master_list(body: &str) -> IndexMap<String, String> {
    let mut entries = IndexMap::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(rest) = line.strip_prefix('[') else {
            continue;
        };
        let Some((_tag, name)) = rest.split_once(']') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            continue;
        }
        let Some(default) = default_value(name) else {
            continue;
        };
        entries.insert(name.to_string(), default.to_string());
    }

    entries
}

pub struct FlagTracker {
    transport: Transport,
    url: Url,
}

impl FlagTracker {
    pub fn new(transport: Transport, url: Url) -> Self {
        FlagTracker { transport, url }
    }

    /// Fetches and parses the master list into name -> default value.
    pub async fn fetch_defaults(&self) -> Result<IndexMap<String, String>, TransportError> {
        let body = self.transport.get_text(self.url.clone()).await?;
        let entries = parse_master_list(&body);
        tracing::debug!(entries = entries.len(), "fetched master flag list");
        Ok(entries)
    }
}
