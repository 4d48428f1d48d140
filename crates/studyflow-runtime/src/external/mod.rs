//! External service gateway and its configuration

pub mod client;
pub mod config;

pub use client::{ExternalEventPayload, ExternalServiceGateway, ExternalServiceResponse};
pub use config::{
    load_external_services, load_external_services_file, ExternalServiceConfig, MutualTlsConfig,
};
