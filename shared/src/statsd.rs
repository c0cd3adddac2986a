use crate::metrics_defs::{MetricDef, describe_all};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
}

pub const fn default_statsd_port() -> u16 {
    8125
}

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("could not build statsd exporter: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderAlreadySet,
}

/// Install a statsd recorder as the process-wide `metrics` recorder.
///
/// Every metric is sent with `prefix` prepended. The definitions in `defs` are
/// registered with their descriptions so the exporter knows about them up front.
pub fn init_statsd(
    config: &MetricsConfig,
    prefix: &str,
    defs: &[MetricDef],
) -> Result<(), MetricsError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(prefix))?;

    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::RecorderAlreadySet)?;
    describe_all(defs);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}
