//! studyflow runtime - rule engine for longitudinal studies
//!
//! Evaluates study rules (expression trees stored as data) against a
//! participant's state when a study event occurs, and produces the new
//! participant state plus any reports to store. Storage is reached only
//! through the [`StudyDbService`] port and outbound HTTP only through the
//! [`ExternalServiceGateway`].

mod action;
pub mod clock;
pub mod context;
pub mod engine;
pub mod error;
mod expression;
pub mod external;
pub mod persistence;
pub mod runner;
pub mod validation;

// Re-export main types
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{ActionData, EvalContext, StateSource};
pub use engine::{StudyEngine, StudyEngineBuilder, DEFAULT_MAX_DEPTH};
pub use error::{Result, RuntimeError};
pub use external::{
    load_external_services, load_external_services_file, ExternalEventPayload,
    ExternalServiceConfig, ExternalServiceGateway, ExternalServiceResponse, MutualTlsConfig,
};
pub use persistence::{
    InMemoryStudyDb, ResponseQuery, SortOrder, StudyDbService, MAX_HISTORY_RESPONSES,
};
pub use runner::{RuleErrorPolicy, RuleFailure, RuleSetOutcome};
pub use validation::{validate_rules, RuleIssue};
