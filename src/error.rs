//! Error taxonomy shared by every context.
//!
//! Errors cross the message channel as a `(code, message)` pair; [`GateError::code`]
//! and [`GateError::from_wire`] are the two halves of that mapping.

use crate::request::RequestKind;

pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Missing or malformed fields in a request.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not connected: call connect() first")]
    NotConnected,

    #[error("wallet provider unavailable")]
    ProviderUnavailable,

    #[error("a {0} request is already pending")]
    RequestConflict(RequestKind),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("surface policy: {0}")]
    Policy(String),

    #[error("request abandoned: the approval window was closed")]
    Abandoned,

    #[error("{0}")]
    Rejected(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub mod codes {
    pub const VALIDATION: &str = "VALIDATION_ERROR";
    pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
    pub const PROVIDER_UNAVAILABLE: &str = "PROVIDER_UNAVAILABLE";
    pub const REQUEST_CONFLICT: &str = "REQUEST_CONFLICT";
    pub const AUTH: &str = "AUTH_ERROR";
    pub const POLICY: &str = "POLICY_ERROR";
    pub const ABANDONED: &str = "ABANDONED";
    pub const REJECTED: &str = "USER_REJECTED";
    pub const EXECUTION: &str = "EXECUTION_FAILED";
    pub const INTERNAL: &str = "INTERNAL_ERROR";
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Validation(_) => codes::VALIDATION,
            GateError::NotConnected => codes::NOT_CONNECTED,
            GateError::ProviderUnavailable => codes::PROVIDER_UNAVAILABLE,
            GateError::RequestConflict(_) => codes::REQUEST_CONFLICT,
            GateError::Auth(_) => codes::AUTH,
            GateError::Policy(_) => codes::POLICY,
            GateError::Abandoned => codes::ABANDONED,
            GateError::Rejected(_) => codes::REJECTED,
            GateError::Execution(_) => codes::EXECUTION,
            GateError::Store(_) | GateError::Crypto(_) | GateError::Serialization(_) => codes::INTERNAL,
        }
    }

    /// The message that travels next to [`GateError::code`]: the inner text
    /// for variants that carry one, the display text otherwise.
    pub fn detail(&self) -> String {
        match self {
            GateError::Validation(msg)
            | GateError::Auth(msg)
            | GateError::Policy(msg)
            | GateError::Rejected(msg)
            | GateError::Execution(msg)
            | GateError::Store(msg)
            | GateError::Crypto(msg)
            | GateError::Serialization(msg) => msg.clone(),
            GateError::NotConnected
            | GateError::ProviderUnavailable
            | GateError::RequestConflict(_)
            | GateError::Abandoned => self.to_string(),
        }
    }

    /// Rebuild an error from a rejected reply. Unknown codes keep their message.
    pub fn from_wire(code: &str, message: &str) -> Self {
        match code {
            codes::VALIDATION => GateError::Validation(message.to_string()),
            codes::NOT_CONNECTED => GateError::NotConnected,
            codes::PROVIDER_UNAVAILABLE => GateError::ProviderUnavailable,
            codes::REQUEST_CONFLICT => {
                let kind = RequestKind::ALL
                    .iter()
                    .copied()
                    .find(|k| message.contains(k.as_str()))
                    .unwrap_or(RequestKind::Connection);
                GateError::RequestConflict(kind)
            }
            codes::AUTH => GateError::Auth(message.to_string()),
            codes::POLICY => GateError::Policy(message.to_string()),
            codes::ABANDONED => GateError::Abandoned,
            codes::REJECTED => GateError::Rejected(message.to_string()),
            codes::EXECUTION => GateError::Execution(message.to_string()),
            _ => GateError::Store(message.to_string()),
        }
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        GateError::Serialization(e.to_string())
    }
}

impl From<nine_s_core::errors::NineSError> for GateError {
    fn from(e: nine_s_core::errors::NineSError) -> Self {
        GateError::Crypto(e.to_string())
    }
}
