//! Metrics definitions for the flag cache.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const REFRESH_SUCCESS: MetricDef = MetricDef {
    name: "refresh.success",
    metric_type: MetricType::Counter,
    description: "Number of refresh cycles that applied a new snapshot",
};

pub const REFRESH_FAILURE: MetricDef = MetricDef {
    name: "refresh.failure",
    metric_type: MetricType::Counter,
    description: "Number of refresh cycles that failed without touching the cache",
};

pub const REFRESH_DURATION: MetricDef = MetricDef {
    name: "refresh.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a fetch-merge-apply cycle in seconds",
};

pub const SETTINGS_FETCH_FAILURE: MetricDef = MetricDef {
    name: "settings.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Number of per-application settings fetches that failed",
};

pub const CLASSIFY_REQUESTS: MetricDef = MetricDef {
    name: "classify.requests",
    metric_type: MetricType::Counter,
    description: "Number of classification requests served from the cache",
};

// TODO: all metrics must be added here for now, this can be done dynamically with a macro in the future.
pub const ALL_METRICS: &[MetricDef] = &[
    REFRESH_SUCCESS,
    REFRESH_FAILURE,
    REFRESH_DURATION,
    SETTINGS_FETCH_FAILURE,
    CLASSIFY_REQUESTS,
];
