//! Dry runs of rule sets
//!
//! A simulation seeds an in-memory study database, applies a rule set to one
//! participant for one event and collects everything the rules produced.

use crate::config::Settings;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use studyflow_core::{
    Expression, Participant, Report, StudyEvent, StudyMessage, StudyVariable, SurveyResponse,
};
use studyflow_runtime::{
    load_external_services_file, ActionData, InMemoryStudyDb, RuleErrorPolicy, StudyEngine,
};
use tracing::{debug, info};

/// Study data present before the event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySeed {
    #[serde(default)]
    pub code_lists: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub counters: HashMap<String, i64>,

    #[serde(default)]
    pub variables: Vec<StudyVariable>,

    /// Earlier submissions, used by history expressions
    #[serde(default)]
    pub responses: Vec<SurveyResponse>,

    #[serde(default)]
    pub confidential_responses: Vec<SurveyResponse>,
}

/// Everything a simulation needs
#[derive(Debug, Clone)]
pub struct Simulation {
    pub rules: Vec<Expression>,
    pub participant: Participant,
    pub event: StudyEvent,
    pub seed: StudySeed,
}

/// A rule that failed during the run
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub index: usize,
    pub rule: String,
    pub error: String,
}

/// Output of a simulation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    #[serde(rename = "pState")]
    pub participant_state: Participant,
    pub reports_to_create: HashMap<String, Report>,
    pub failures: Vec<FailureSummary>,
    pub researcher_messages: Vec<StudyMessage>,
}

/// Read a JSON or YAML document; `.yaml`/`.yml` files are parsed as YAML
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in {}", path.display())),
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON in {}", path.display())),
    }
}

impl Simulation {
    /// Load a simulation from its files; the seed is optional
    pub fn load(
        rules: &Path,
        participant: &Path,
        event: &Path,
        seed: Option<&Path>,
    ) -> Result<Self> {
        Ok(Self {
            rules: read_document(rules)?,
            participant: read_document(participant)?,
            event: read_document(event)?,
            seed: match seed {
                Some(path) => read_document(path)?,
                None => StudySeed::default(),
            },
        })
    }

    /// Run the rule set with the given settings and policy
    pub async fn run(
        self,
        settings: &Settings,
        policy: RuleErrorPolicy,
    ) -> Result<SimulationReport> {
        let db = Arc::new(InMemoryStudyDb::new());
        seed_study(&db, &self.event, self.seed).await;

        let mut builder = StudyEngine::builder(db.clone()).with_max_depth(settings.max_depth);
        if let Some(path) = &settings.services_file {
            let services = load_external_services_file(path)?;
            debug!(count = services.len(), "external services loaded");
            builder = builder.with_external_services(services);
        }
        let engine = builder.build()?;

        info!(
            rules = self.rules.len(),
            participant = %self.participant.participant_id,
            event_type = %self.event.event_type,
            "running rule set"
        );

        let outcome = engine
            .apply_rules(&self.rules, ActionData::new(self.participant), &self.event, policy)
            .await?;

        let researcher_messages = db
            .researcher_messages(&self.event.instance_id, &self.event.study_key)
            .await;

        Ok(SimulationReport {
            participant_state: outcome.state.participant_state,
            reports_to_create: outcome.state.reports_to_create,
            failures: outcome
                .failures
                .into_iter()
                .map(|f| FailureSummary {
                    index: f.index,
                    rule: f.rule,
                    error: f.error.to_string(),
                })
                .collect(),
            researcher_messages,
        })
    }
}

async fn seed_study(db: &InMemoryStudyDb, event: &StudyEvent, seed: StudySeed) {
    let (instance_id, study_key) = (event.instance_id.as_str(), event.study_key.as_str());

    for (list_key, codes) in seed.code_lists {
        db.add_study_codes(instance_id, study_key, &list_key, codes).await;
    }
    for (scope, value) in seed.counters {
        db.set_counter(instance_id, study_key, &scope, value).await;
    }
    for variable in seed.variables {
        db.set_study_variable(instance_id, study_key, variable).await;
    }
    for response in seed.responses {
        db.add_response(instance_id, study_key, response).await;
    }
    for response in seed.confidential_responses {
        db.add_confidential_response(instance_id, study_key, response).await;
    }
}
