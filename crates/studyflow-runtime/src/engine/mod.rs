//! Study engine
//!
//! `StudyEngine` bundles everything rule evaluation needs from the outside
//! world: the persistence port, the external service gateway and the clock.
//! It is built once and is read-only afterwards, so one engine can serve
//! concurrent evaluations for many participants.

pub mod registry;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::external::{ExternalServiceConfig, ExternalServiceGateway};
use crate::persistence::StudyDbService;
use std::sync::Arc;

/// Default maximum nesting depth of rule trees
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Rule engine for one deployment
pub struct StudyEngine {
    pub(crate) db: Arc<dyn StudyDbService>,
    pub(crate) gateway: ExternalServiceGateway,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) max_depth: usize,
}

impl StudyEngine {
    /// Start building an engine around a persistence port
    pub fn builder(db: Arc<dyn StudyDbService>) -> StudyEngineBuilder {
        StudyEngineBuilder::new(db)
    }

    /// Engine with the system clock and no external services
    pub fn new(db: Arc<dyn StudyDbService>) -> Self {
        Self {
            db,
            gateway: ExternalServiceGateway::default(),
            clock: Arc::new(SystemClock),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn gateway(&self) -> &ExternalServiceGateway {
        &self.gateway
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Current time as unix seconds
    pub(crate) fn now(&self) -> i64 {
        self.clock.unix()
    }
}

/// Builder for `StudyEngine`
///
/// # Example
///
/// ```rust,ignore
/// let engine = StudyEngine::builder(Arc::new(InMemoryStudyDb::new()))
///     .with_external_services(load_external_services_file("services.yaml")?)
///     .with_clock(Arc::new(FixedClock::new(1_700_000_000)))
///     .build()?;
/// ```
pub struct StudyEngineBuilder {
    db: Arc<dyn StudyDbService>,
    services: Vec<ExternalServiceConfig>,
    clock: Arc<dyn Clock>,
    max_depth: usize,
}

impl StudyEngineBuilder {
    pub fn new(db: Arc<dyn StudyDbService>) -> Self {
        Self {
            db,
            services: Vec::new(),
            clock: Arc::new(SystemClock),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the external services
    pub fn with_external_services(mut self, services: Vec<ExternalServiceConfig>) -> Self {
        self.services = services;
        self
    }

    /// Set the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the maximum rule nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the engine, creating one HTTP client per external service
    pub fn build(self) -> Result<StudyEngine> {
        Ok(StudyEngine {
            db: self.db,
            gateway: ExternalServiceGateway::new(self.services)?,
            clock: self.clock,
            max_depth: self.max_depth,
        })
    }
}
