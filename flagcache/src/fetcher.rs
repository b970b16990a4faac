//! Multi-source fetch and merge.
//!
//! One fetch cycle pulls the master flag list plus every application's
//! settings endpoint, then merges them under a fixed precedence rule:
//! application-defined values always win, master defaults only fill gaps.

use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tokio::task::JoinSet;
use url::Url;

use crate::metrics_defs::SETTINGS_FETCH_FAILURE;
use crate::tracker::{FlagTracker, PRIMARY_BOOL_PREFIX};
use crate::transport::Transport;
use crate::types::{ApplicationId, Flag, RawFlags, Snapshot, parse_enabled};

const PLACE_FILTER_SUFFIX: &str = "_PlaceFilter";

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("invalid settings endpoint for {0}: {1}")]
    InvalidEndpoint(ApplicationId, String),

    #[error("all upstream sources failed")]
    AllSourcesFailed,

    #[error("refresh worker is not running")]
    WorkerStopped,
}

/// Wire shape of a settings endpoint response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationSettings {
    application_settings: IndexMap<String, String>,
}

pub struct SourceFetcher {
    transport: Transport,
    settings_url: Url,
    tracker: FlagTracker,
}

impl SourceFetcher {
    pub fn new(transport: Transport, settings_url: Url, tracker_url: Url) -> Self {
        SourceFetcher {
            transport: transport.clone(),
            settings_url,
            tracker: FlagTracker::new(transport, tracker_url),
        }
    }

    /// Fetches the master list and every application's settings, then merges.
    ///
    /// Individual failures degrade that source for this cycle: a failed
    /// application is simply absent from the result, a failed master fetch
    /// means no defaults get injected. Only a cycle where every source fails
    /// is reported as an error.
    pub async fn fetch_all(&self) -> Result<RawFlags, FetchError> {
        let defaults = match self.tracker.fetch_defaults().await {
            Ok(defaults) => defaults,
            Err(err) => {
                tracing::warn!(error = %err, "master flag list unavailable, merging without defaults");
                IndexMap::new()
            }
        };

        let mut tasks = JoinSet::new();
        for app in ApplicationId::FETCHABLE {
            let transport = self.transport.clone();
            let url = self.application_url(app)?;
            tasks.spawn(async move {
                let result = transport.get_json::<ApplicationSettings>(url).await;
                (app, result)
            });
        }

        let mut raw = RawFlags::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((app, result)) = joined else {
                continue;
            };
            match result {
                Ok(settings) => {
                    tracing::debug!(
                        application = %app,
                        entries = settings.application_settings.len(),
                        "fetched application settings"
                    );
                    raw.insert(app, settings.application_settings);
                }
                Err(err) if err.is_not_found() => {
                    tracing::debug!(application = %app, "no settings published");
                }
                Err(err) => {
                    metrics::counter!(SETTINGS_FETCH_FAILURE.name).increment(1);
                    tracing::error!(application = %app, error = %err, "application settings fetch failed");
                }
            }
        }

        if raw.is_empty() && defaults.is_empty() {
            return Err(FetchError::AllSourcesFailed);
        }

        Ok(merge(raw, defaults))
    }

    fn application_url(&self, app: ApplicationId) -> Result<Url, FetchError> {
        let base = self.settings_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{app}"))
            .map_err(|err| FetchError::InvalidEndpoint(app, err.to_string()))
    }
}

/// A master-list entry is added to an application's settings only if that
/// application does not already define the name; it never overwrites an
/// application-defined value. The synthetic `ALL` entry holds the master
/// defaults verbatim.
fn merge(mut raw: RawFlags, defaults: IndexMap<String, String>) -> RawFlags {
    if defaults.is_empty() {
        return raw;
    }

    for settings in raw.values_mut() {
        for (name, value) in &defaults {
            if !settings.contains_key(name) {
                settings.insert(name.clone(), value.clone());
            }
        }
    }

    raw.insert(ApplicationId::All, defaults);
    raw
}

/// Promotes raw entries carrying the primary boolean prefix into typed
/// `Flag` records. `_PlaceFilter` entries are not flags themselves; their
/// place ids attach to the base flag when one exists. Integer and string
/// entries stay in the raw map only.
pub fn build_snapshot(raw: &RawFlags, now: u64) -> Snapshot {
    let mut applications = HashMap::new();

    for (app, settings) in raw {
        let mut flags: Vec<Flag> = Vec::new();
        let mut by_name: HashMap<&str, usize> = HashMap::new();

        for (name, value) in settings {
            if !name.starts_with(PRIMARY_BOOL_PREFIX) || name.ends_with(PLACE_FILTER_SUFFIX) {
                continue;
            }
            by_name.insert(name.as_str(), flags.len());
            flags.push(Flag {
                name: name.clone(),
                enabled: parse_enabled(value),
                last_updated: now,
                places: BTreeSet::new(),
            });
        }

        for (name, value) in settings {
            let Some(base) = name.strip_suffix(PLACE_FILTER_SUFFIX) else {
                continue;
            };
            let Some(&index) = by_name.get(base) else {
                continue;
            };
            // Place filter values look like "<enabled>;<place>;<place>;..."
            flags[index].places.extend(
                value
                    .split(';')
                    .skip(1)
                    .filter(|place| !place.is_empty())
                    .map(str::to_string),
            );
        }

        applications.insert(*app, flags);
    }

    Snapshot {
        applications,
        last_fetch: None,
    }
}
