//! Administrator-curated flag lists, loaded once at startup and read-only
//! for the life of the process.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Default)]
pub struct StaticLists {
    /// Names an administrator has explicitly endorsed. Exposed to callers,
    /// not consulted by the classification algorithm itself.
    pub allow: HashSet<String>,
    /// Names classified as risky regardless of where they are defined.
    pub risk: HashSet<String>,
}

impl StaticLists {
    /// Loads both lists from JSON string arrays. A missing or malformed file
    /// degrades to an empty set; the service keeps operating without it.
    pub fn load(allow_path: &Path, risk_path: &Path) -> Self {
        StaticLists {
            allow: read_list(allow_path),
            risk: read_list(risk_path),
        }
    }
}

fn read_list(path: &Path) -> HashSet<String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "flag list unavailable, using empty set");
            return HashSet::new();
        }
    };

    match serde_json::from_reader(BufReader::new(file)) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "flag list malformed, using empty set");
            HashSet::new()
        }
    }
}
