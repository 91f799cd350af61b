//! Usage records and their submission

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TelemetryConfig;
use crate::errors::{BestEffort, Result, WizardError};
use crate::security::UrlValidator;
use crate::telemetry::machine_id::machine_uuid;

/// Coarse position, rounded to half a degree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn rounded(lat: f64, lon: f64) -> Self {
        Self {
            lat: round_half_degree(lat),
            lon: round_half_degree(lon),
        }
    }
}

fn round_half_degree(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

/// One anonymized record sent after a successful upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub host_uuid: String,
    /// `None` when the lookup failed
    pub location: Option<Location>,
    pub environment: String,
    pub release: String,
    pub config_file: String,
}

/// Destination for usage records
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Coarse location of this machine
    async fn locate(&self) -> Result<Location>;

    async fn submit(&self, record: &UsageRecord) -> Result<()>;
}

/// HTTP collector plus IP geolocation lookup
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: Option<String>,
    location_url: String,
}

impl HttpTelemetrySink {
    pub fn new(config: &TelemetryConfig, user_agent: &str) -> Result<Self> {
        let endpoint = config.require_endpoint().ok().map(str::to_string);
        if let Some(endpoint) = &endpoint {
            UrlValidator::validate_endpoint_url(endpoint)?;
        }
        UrlValidator::validate_endpoint_url(&config.location_url)?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            location_url: config.location_url.clone(),
        })
    }
}

#[derive(Deserialize)]
struct LocationResponse {
    lat: f64,
    lon: f64,
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn locate(&self) -> Result<Location> {
        let response = self.client.get(&self.location_url).send().await?;
        if !response.status().is_success() {
            return Err(WizardError::Download(format!(
                "location lookup returned {}",
                response.status()
            )));
        }
        let position: LocationResponse = response.json().await?;
        Ok(Location::rounded(position.lat, position.lon))
    }

    async fn submit(&self, record: &UsageRecord) -> Result<()> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            WizardError::TelemetrySubmission("no collector endpoint configured".to_string())
        })?;
        let response = self
            .client
            .post(endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| WizardError::TelemetrySubmission(e.to_string()))?;
        if !response.status().is_success() {
            return Err(WizardError::TelemetrySubmission(format!(
                "collector returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Assemble a record. Never fails: every lookup has a safe default.
pub async fn collect_record(
    sink: &dyn TelemetrySink,
    environment: &str,
    release: &str,
    config_path: Option<&Path>,
) -> UsageRecord {
    let location = sink.locate().await.map(Some).or_safe_default(None, "location lookup");
    let config_file = match config_path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(WizardError::from)
            .or_safe_default(String::new(), "reading local configuration"),
        None => String::new(),
    };

    UsageRecord {
        host_uuid: machine_uuid(),
        location,
        environment: environment.to_string(),
        release: release.to_string(),
        config_file,
    }
}

/// Collect and submit a record; the error is only ever logged by callers
pub async fn submit_usage(
    sink: &dyn TelemetrySink,
    environment: &str,
    release: &str,
    config_path: Option<&Path>,
) -> Result<()> {
    let record = collect_record(sink, environment, release, config_path).await;
    log::debug!(
        "Submitting usage record for {} ({})",
        record.environment,
        record.release
    );
    sink.submit(&record).await.map_err(|e| match e {
        WizardError::TelemetrySubmission(_) => e,
        other => WizardError::TelemetrySubmission(other.to_string()),
    })
}
