use crate::client::{ClientFactory, Service};
use crate::config::{CONVERTER_SERVICE_CONVERT_CI_ENDPOINT, ConverterConfig};
use crate::errors::{INSTRUMENT_CONVERSION, ProxyError, Result};
use crate::metrics_defs::CONVERSIONS;
use crate::types::{ConversionParams, ConversionRequest, Instrument};
use crate::version::{VersionSource, parse_version};
use serde_json::Value;
use shared::counter;
use std::cmp::Ordering;
use std::sync::Arc;

/// Brings instruments up to a requested validator version.
///
/// Instruments already at the target are returned as they are. Older ones are
/// sent to the converter service, and newer ones are rejected since the
/// converter only upgrades.
pub struct Converter {
    config: ConverterConfig,
    clients: Arc<ClientFactory>,
}

impl Converter {
    pub fn new(config: ConverterConfig, clients: Arc<ClientFactory>) -> Self {
        Converter { config, clients }
    }

    pub async fn convert_instrument(
        &self,
        instrument: Instrument,
        target_version: &str,
    ) -> Result<Value> {
        let Some(current_version) = instrument.validator_version() else {
            tracing::error!(instrument_id = ?instrument.id(), "Instrument version is missing");
            return Err(ProxyError::InvalidInstrument);
        };

        let current = parse_version(VersionSource::Current, &current_version)?;
        let target = parse_version(VersionSource::Target, target_version)?;

        match current.cmp(&target) {
            Ordering::Less => {
                tracing::debug!(
                    %current_version,
                    target_version,
                    "Instrument requires updating, requesting conversion"
                );
                let converted = self
                    .request_conversion(&instrument, &current_version, target_version)
                    .await?;
                counter!(CONVERSIONS, "outcome" => "converted").increment(1);
                Ok(converted)
            }
            Ordering::Equal => {
                tracing::info!(%current_version, "Instrument version matches the target");
                counter!(CONVERSIONS, "outcome" => "unchanged").increment(1);
                Ok(Value::Object(instrument.into_inner()))
            }
            Ordering::Greater => {
                tracing::warn!(
                    %current_version,
                    target_version,
                    "Instrument version is higher than target"
                );
                counter!(CONVERSIONS, "outcome" => "downgrade_rejected").increment(1);
                Err(ProxyError::DowngradeNotSupported)
            }
        }
    }

    async fn request_conversion(
        &self,
        instrument: &Instrument,
        current_version: &str,
        target_version: &str,
    ) -> Result<Value> {
        let upstream = self.config.upstream();
        upstream.require_base_url()?;
        let endpoint = self.config.convert_endpoint.as_str();
        if endpoint.is_empty() {
            tracing::error!(
                setting = CONVERTER_SERVICE_CONVERT_CI_ENDPOINT,
                "Converter endpoint is not configured"
            );
            return Err(ProxyError::Configuration(
                CONVERTER_SERVICE_CONVERT_CI_ENDPOINT,
            ));
        }

        let client = self.clients.acquire(upstream).await?;
        let response = client
            .post_json(
                endpoint,
                &ConversionParams {
                    current_version,
                    target_version,
                },
                &ConversionRequest { instrument },
            )
            .await
            .map_err(|source| {
                tracing::error!(error = %source, "Error occurred while converting instrument");
                ProxyError::Connection {
                    service: Service::Converter,
                    source,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                response_text = %text,
                "Converter service rejected the conversion"
            );
            return Err(ProxyError::Upstream {
                message: INSTRUMENT_CONVERSION,
                status: Some(status),
            });
        }

        // Whatever JSON the converter answers with is the new instrument.
        response.json::<Value>().await.map_err(|e| {
            tracing::error!(error = %e, "Converter service returned a body that is not JSON");
            ProxyError::Upstream {
                message: INSTRUMENT_CONVERSION,
                status: Some(status),
            }
        })
    }
}
