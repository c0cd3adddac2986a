use crate::client::{ClientFactory, Service};
use crate::config::{CIR_RETRIEVE_CI_ENDPOINT, CIR_RETRIEVE_CI_METADATA_ENDPOINT, CirConfig};
use crate::errors::{
    INSTRUMENT_METADATA_NOT_FOUND, INSTRUMENT_METADATA_PROCESSING, INSTRUMENT_NOT_FOUND,
    INSTRUMENT_PROCESSING, ProxyError, Result,
};
use crate::types::{Instrument, InstrumentMetadata};
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// What is being fetched from CIR.
#[derive(Clone, Copy, Debug)]
enum Resource {
    Instrument,
    Metadata,
}

impl Resource {
    fn endpoint_setting(self) -> &'static str {
        match self {
            Resource::Instrument => CIR_RETRIEVE_CI_ENDPOINT,
            Resource::Metadata => CIR_RETRIEVE_CI_METADATA_ENDPOINT,
        }
    }

    fn not_found(self) -> &'static str {
        match self {
            Resource::Instrument => INSTRUMENT_NOT_FOUND,
            Resource::Metadata => INSTRUMENT_METADATA_NOT_FOUND,
        }
    }

    fn processing_error(self) -> &'static str {
        match self {
            Resource::Instrument => INSTRUMENT_PROCESSING,
            Resource::Metadata => INSTRUMENT_METADATA_PROCESSING,
        }
    }
}

/// Fetches instruments and their metadata from the Collection Instrument Repository.
pub struct Retriever {
    config: CirConfig,
    clients: Arc<ClientFactory>,
}

impl Retriever {
    pub fn new(config: CirConfig, clients: Arc<ClientFactory>) -> Self {
        Retriever { config, clients }
    }

    pub async fn retrieve_instrument(&self, instrument_id: Uuid) -> Result<Instrument> {
        tracing::debug!(%instrument_id, "Retrieving instrument from CIR");
        self.fetch(Resource::Instrument, &self.config.retrieve_endpoint, instrument_id)
            .await
    }

    pub async fn retrieve_instrument_metadata(
        &self,
        instrument_id: Uuid,
    ) -> Result<InstrumentMetadata> {
        tracing::debug!(%instrument_id, "Retrieving instrument metadata from CIR");
        self.fetch(Resource::Metadata, &self.config.metadata_endpoint, instrument_id)
            .await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        resource: Resource,
        endpoint: &str,
        instrument_id: Uuid,
    ) -> Result<T> {
        // Both settings are checked before anything touches the network.
        let upstream = self.config.upstream();
        upstream.require_base_url()?;
        if endpoint.is_empty() {
            let setting = resource.endpoint_setting();
            tracing::error!(setting, "CIR endpoint is not configured");
            return Err(ProxyError::Configuration(setting));
        }

        let client = self.clients.acquire(upstream).await?;
        let guid = instrument_id.to_string();
        let response = client
            .get(endpoint, &[("guid", guid.as_str())])
            .await
            .map_err(|source| {
                tracing::error!(%instrument_id, ?resource, error = %source, "Error connecting to CIR");
                ProxyError::Connection {
                    service: Service::Cir,
                    source,
                }
            })?;

        match response.status() {
            StatusCode::OK => {
                let body = response.json::<T>().await.map_err(|e| {
                    tracing::error!(%instrument_id, ?resource, error = %e, "Failed to parse CIR response");
                    ProxyError::Upstream {
                        message: resource.processing_error(),
                        status: Some(StatusCode::OK),
                    }
                })?;
                tracing::info!(%instrument_id, ?resource, "Retrieved from CIR");
                Ok(body)
            }
            StatusCode::NOT_FOUND => {
                let text = response.text().await.unwrap_or_default();
                tracing::error!(%instrument_id, ?resource, response_text = %text, "Not found in CIR");
                Err(ProxyError::NotFound(resource.not_found()))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                tracing::error!(
                    %instrument_id,
                    ?resource,
                    status = status.as_u16(),
                    response_text = %text,
                    "Failed to retrieve from CIR"
                );
                Err(ProxyError::Upstream {
                    message: resource.processing_error(),
                    status: Some(status),
                })
            }
        }
    }
}
