//! Error types for the Varco gateway

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VarcoError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("State token mismatch")]
    StateMismatch,

    #[error("Upstream HTTP error from {service}: {message}")]
    UpstreamHttp { service: String, message: String },

    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("Identity reconciliation failed: {message}")]
    Reconciliation { message: String },

    #[error("Unsafe redirect destination: {destination}")]
    RedirectSafety { destination: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VarcoError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn malformed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VarcoError>;
