//! Metrics definitions for the instrument proxy.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    metric_type: MetricType::Counter,
    description: "Inbound requests, tagged by route and response status",
};

pub const UPSTREAM_REQUESTS: MetricDef = MetricDef {
    name: "upstream.requests",
    metric_type: MetricType::Counter,
    description: "Outbound requests to CIR and the converter, tagged by service and outcome",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Time taken by an outbound request in seconds, tagged by service",
};

pub const CONVERSIONS: MetricDef = MetricDef {
    name: "conversions",
    metric_type: MetricType::Counter,
    description: "Version comparisons, tagged by the branch taken",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUESTS, UPSTREAM_REQUESTS, UPSTREAM_DURATION, CONVERSIONS];
