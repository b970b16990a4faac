use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors surfaced to the query layer. Everything else (upstream fetch
/// failures, persistence failures) is recovered internally.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ServiceError {
    #[error("invalid application id: {0}")]
    InvalidApplication(String),

    #[error("invalid request input: {0}")]
    InvalidInput(&'static str),
}

/// One enumerated client variant whose settings are fetched independently,
/// plus the synthetic `ALL` entry that holds the master flag list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationId {
    #[serde(rename = "PCDesktopClient")]
    PcDesktopClient,
    #[serde(rename = "MacDesktopClient")]
    MacDesktopClient,
    #[serde(rename = "AndroidApp")]
    AndroidApp,
    #[serde(rename = "iOSApp")]
    IosApp,
    #[serde(rename = "XboxClient")]
    XboxClient,
    #[serde(rename = "PCStudioApp")]
    PcStudioApp,
    #[serde(rename = "MacStudioApp")]
    MacStudioApp,
    #[serde(rename = "UWPApp")]
    UwpApp,
    #[serde(rename = "ALL")]
    All,
}

impl ApplicationId {
    /// Every application with its own settings endpoint. `ALL` is synthetic
    /// and never fetched directly.
    pub const FETCHABLE: [ApplicationId; 8] = [
        ApplicationId::PcDesktopClient,
        ApplicationId::MacDesktopClient,
        ApplicationId::AndroidApp,
        ApplicationId::IosApp,
        ApplicationId::XboxClient,
        ApplicationId::PcStudioApp,
        ApplicationId::MacStudioApp,
        ApplicationId::UwpApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationId::PcDesktopClient => "PCDesktopClient",
            ApplicationId::MacDesktopClient => "MacDesktopClient",
            ApplicationId::AndroidApp => "AndroidApp",
            ApplicationId::IosApp => "iOSApp",
            ApplicationId::XboxClient => "XboxClient",
            ApplicationId::PcStudioApp => "PCStudioApp",
            ApplicationId::MacStudioApp => "MacStudioApp",
            ApplicationId::UwpApp => "UWPApp",
            ApplicationId::All => "ALL",
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationId {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCDesktopClient" => Ok(ApplicationId::PcDesktopClient),
            "MacDesktopClient" => Ok(ApplicationId::MacDesktopClient),
            "AndroidApp" => Ok(ApplicationId::AndroidApp),
            "iOSApp" => Ok(ApplicationId::IosApp),
            "XboxClient" => Ok(ApplicationId::XboxClient),
            "PCStudioApp" => Ok(ApplicationId::PcStudioApp),
            "MacStudioApp" => Ok(ApplicationId::MacStudioApp),
            "UWPApp" => Ok(ApplicationId::UwpApp),
            "ALL" => Ok(ApplicationId::All),
            other => Err(ServiceError::InvalidApplication(other.to_string())),
        }
    }
}

/// A named boolean feature toggle scoped to one application. Instances are
/// built fresh on every refresh cycle and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Flag {
    pub name: String,
    pub enabled: bool,
    /// Seconds since 1970-01-01 00:00:00 UTC.
    pub last_updated: u64,
    pub places: BTreeSet<String>,
}

/// The raw merged fetch result: every recognized entry (boolean, integer and
/// string prefixes alike), keyed by application, in upstream order. This is
/// the form that gets persisted for cold-start recovery.
pub type RawFlags = HashMap<ApplicationId, IndexMap<String, String>>;

/// The full merged, cached state for all applications at one point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub applications: HashMap<ApplicationId, Vec<Flag>>,
    /// Set only by live fetch cycles, not by cold-start seeding.
    pub last_fetch: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
pub struct CacheStats {
    pub uptime_secs: u64,
    pub last_fetch: Option<u64>,
    pub cache_size: usize,
}

/// A partition of the request's flag names. The three sets are pairwise
/// disjoint and together cover the deduplicated input.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub valid: BTreeSet<String>,
    pub invalid: BTreeSet<String>,
    pub risk: BTreeSet<String>,
}

pub fn parse_enabled(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
