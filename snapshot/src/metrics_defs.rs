//! Metrics definitions for the snapshot engine.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

pub const FETCH_SUCCESS: MetricDef = MetricDef {
    name: "snapshot.fetch.success",
    metric_type: MetricType::Counter,
    description: "Number of successful snapshot fetches from the control plane",
};

pub const FETCH_FAILURE: MetricDef = MetricDef {
    name: "snapshot.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Number of failed snapshot fetches",
};

pub const FETCH_DURATION: MetricDef = MetricDef {
    name: "snapshot.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a snapshot fetch in milliseconds",
};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "snapshot.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of policy lookups served from the snapshot cache",
};

pub const CACHE_UNAVAILABLE: MetricDef = MetricDef {
    name: "snapshot.cache.unavailable",
    metric_type: MetricType::Counter,
    description: "Number of policy lookups that found no unexpired snapshot",
};

pub const REFRESH_TICK_DROPPED: MetricDef = MetricDef {
    name: "snapshot.refresh.tick_dropped",
    metric_type: MetricType::Counter,
    description: "Refresh ticks dropped because a refresh was already in flight",
};

// TODO: all metrics must be added here for now, this can be done dynamically with a macro in the future.
pub const ALL_METRICS: &[MetricDef] = &[
    FETCH_SUCCESS,
    FETCH_FAILURE,
    FETCH_DURATION,
    CACHE_HIT,
    CACHE_UNAVAILABLE,
    REFRESH_TICK_DROPPED,
];
