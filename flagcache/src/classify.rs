//! Flag-name classification against the cached snapshot and the static
//! risk list.

use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

use crate::cache::FlagCache;
use crate::lists::StaticLists;
use crate::types::{ApplicationId, ClassificationResult, ServiceError};

/// Partitions `flags` into risky, valid and invalid names.
///
/// Risk membership wins: a name on the risk list never appears in `valid`
/// or `invalid`, even when some application defines it. Of the rest, a name
/// is valid as soon as any requested application's cached flag set contains
/// it; whatever survives every application is invalid.
pub fn classify(
    cache: &FlagCache,
    lists: &StaticLists,
    flags: &[String],
    applications: &[String],
) -> Result<ClassificationResult, ServiceError> {
    if flags.is_empty() {
        return Err(ServiceError::InvalidInput("flags must not be empty"));
    }
    if applications.is_empty() {
        return Err(ServiceError::InvalidInput("applications must not be empty"));
    }

    // Reject unknown identifiers before any set math
    let mut apps = Vec::with_capacity(applications.len());
    for raw in applications {
        apps.push(ApplicationId::from_str(raw)?);
    }

    let mut remaining: HashSet<String> = flags.iter().cloned().collect();

    let risk: BTreeSet<String> = remaining
        .iter()
        .filter(|name| lists.risk.contains(*name))
        .cloned()
        .collect();
    for name in &risk {
        remaining.remove(name);
    }

    let mut valid = BTreeSet::new();
    for app in apps {
        if remaining.is_empty() {
            break;
        }
        let cached = cache.names_for(app);
        for name in remaining.intersection(&cached) {
            valid.insert(name.clone());
        }
        remaining.retain(|name| !cached.contains(name));
    }

    Ok(ClassificationResult {
        valid,
        invalid: remaining.into_iter().collect(),
        risk,
    })
}
