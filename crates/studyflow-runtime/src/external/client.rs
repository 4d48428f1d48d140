//! External service gateway
//!
//! POSTs participant state and event data to configured services and returns
//! their answer. Used by `externalEventEval` and `EXTERNAL_EVENT_HANDLER`.

use super::config::ExternalServiceConfig;
use crate::context::ActionData;
use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use studyflow_core::{Participant, Report, StudyEvent, SurveyResponse};

/// Request body sent to external services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEventPayload {
    pub participant_state: Participant,
    pub event_type: String,
    pub study_key: String,
    #[serde(rename = "instanceID")]
    pub instance_id: String,
    pub survey_responses: Vec<SurveyResponse>,
    pub event_key: String,
    pub payload: HashMap<String, serde_json::Value>,
}

impl ExternalEventPayload {
    /// Build the payload for an event and the participant state it applies to
    pub fn new(participant_state: &Participant, event: &StudyEvent) -> Self {
        Self {
            participant_state: participant_state.clone(),
            event_type: event.event_type.to_string(),
            study_key: event.study_key.clone(),
            instance_id: event.instance_id.clone(),
            survey_responses: event.response.iter().cloned().collect(),
            event_key: event.event_key.clone(),
            payload: event.payload.clone(),
        }
    }
}

/// Answer of an external service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalServiceResponse {
    /// Expression result, for `externalEventEval`
    #[serde(default)]
    pub value: Option<serde_json::Value>,

    /// Replacement participant state, for `EXTERNAL_EVENT_HANDLER`
    #[serde(rename = "pState", default)]
    pub participant_state: Option<Participant>,

    /// Extra reports, for `EXTERNAL_EVENT_HANDLER`
    #[serde(rename = "reportsToCreate", default)]
    pub reports_to_create: Option<HashMap<String, Report>>,
}

impl ExternalServiceResponse {
    /// Merge returned state and reports into `state`
    pub fn apply_to(self, state: &mut ActionData) {
        if let Some(participant_state) = self.participant_state {
            state.participant_state = participant_state;
        }
        if let Some(reports) = self.reports_to_create {
            state.reports_to_create.extend(reports);
        }
    }
}

/// Configured service with its HTTP client
#[derive(Debug, Clone)]
struct ServiceClient {
    config: ExternalServiceConfig,
    client: reqwest::Client,
}

/// Client for the configured external services
///
/// Holds one HTTP client per service, built when the gateway is created.
/// Certificate files are read at that point.
#[derive(Debug, Clone, Default)]
pub struct ExternalServiceGateway {
    services: HashMap<String, ServiceClient>,
}

impl ExternalServiceGateway {
    pub fn new(services: Vec<ExternalServiceConfig>) -> Result<Self> {
        let mut clients = HashMap::with_capacity(services.len());
        for config in services {
            let client = Self::build_client(&config)?;
            clients.insert(config.name.clone(), ServiceClient { config, client });
        }
        Ok(Self { services: clients })
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ExternalServiceConfig> {
        self.services.get(name).map(|entry| &entry.config)
    }

    /// Names of all configured services
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Call a service with an event payload
    pub async fn call(
        &self,
        service_name: &str,
        route: Option<&str>,
        payload: &ExternalEventPayload,
    ) -> Result<ExternalServiceResponse> {
        let ServiceClient { config, client } = self.services.get(service_name).ok_or_else(|| {
            RuntimeError::ExternalService(format!("Unknown external service: {}", service_name))
        })?;

        let url = Self::endpoint_url(&config.url, route);

        tracing::debug!(service = service_name, url = %url, "calling external service");

        let mut request = client.post(&url).json(payload);
        if let Some(api_key) = &config.api_key {
            request = request.header("Api-Key", api_key);
        }

        let response = request.send().await.map_err(|e| {
            RuntimeError::ExternalService(format!("Request to {} failed: {}", service_name, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::ExternalService(format!(
                "{} responded with status {}: {}",
                service_name, status, body
            )));
        }

        response.json::<ExternalServiceResponse>().await.map_err(|e| {
            RuntimeError::ExternalService(format!(
                "Failed to parse response from {}: {}",
                service_name, e
            ))
        })
    }

    fn endpoint_url(base: &str, route: Option<&str>) -> String {
        let base = base.trim_end_matches('/');
        match route.map(|r| r.trim_start_matches('/')) {
            Some(route) if !route.is_empty() => format!("{}/{}", base, route),
            _ => base.to_string(),
        }
    }

    fn build_client(service: &ExternalServiceConfig) -> Result<reqwest::Client> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(service.timeout));

        if let Some(tls) = &service.mutual_tls {
            let mut pem = read_pem(&tls.cert_file)?;
            pem.extend(read_pem(&tls.key_file)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                RuntimeError::Config(format!(
                    "Invalid client certificate for {}: {}",
                    service.name, e
                ))
            })?;
            builder = builder.use_rustls_tls().identity(identity);

            if let Some(ca_file) = &tls.ca_file {
                let ca = reqwest::Certificate::from_pem(&read_pem(ca_file)?).map_err(|e| {
                    RuntimeError::Config(format!(
                        "Invalid CA certificate for {}: {}",
                        service.name, e
                    ))
                })?;
                builder = builder.add_root_certificate(ca);
            }
        }

        builder
            .build()
            .map_err(|e| RuntimeError::Config(format!("Failed to create HTTP client: {}", e)))
    }
}

fn read_pem(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| RuntimeError::Config(format!("Failed to read {}: {}", path.display(), e)))
}
