//! Job envelope and payload types.
//!
//! A job travels through the queue as a JSON envelope:
//!
//! ```text
//! {"type": "register_audit", "payload": {"action": "create", ...}}
//! ```
//!
//! [`Job`] is the closed set of job kinds, each carrying its own payload
//! record, so dispatch is an exhaustive `match`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown job kind: {0:?}")]
    UnknownKind(String),

    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: JobKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The kind tag carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ProcessTransmutation,
    RegisterAudit,
    DailyVerification,
}

impl JobKind {
    /// Returns the wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcessTransmutation => "process_transmutation",
            Self::RegisterAudit => "register_audit",
            Self::DailyVerification => "daily_verification",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process_transmutation" => Ok(Self::ProcessTransmutation),
            "register_audit" => Ok(Self::RegisterAudit),
            "daily_verification" => Ok(Self::DailyVerification),
            other => Err(EnvelopeError::UnknownKind(other.to_owned())),
        }
    }
}

/// Request to run the long-running processing of one transmutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessTransmutationPayload {
    pub transmutation_id: u64,
    #[serde(default)]
    pub requested_by: String,
}

/// Request to persist one audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterAuditPayload {
    pub action: String,
    pub entity: String,
    pub entity_id: u64,
    pub user_email: String,
    pub details: String,
}

/// Marker for a verification sweep; the timestamp is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyVerificationPayload {
    pub executed_at: DateTime<Utc>,
}

/// A decoded job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    ProcessTransmutation(ProcessTransmutationPayload),
    RegisterAudit(RegisterAuditPayload),
    DailyVerification(DailyVerificationPayload),
}

#[derive(Serialize)]
struct EnvelopeOut<'a, P> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a P,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl Job {
    /// Returns the kind tag of this job.
    pub fn kind(&self) -> JobKind {
        match self {
            Self::ProcessTransmutation(_) => JobKind::ProcessTransmutation,
            Self::RegisterAudit(_) => JobKind::RegisterAudit,
            Self::DailyVerification(_) => JobKind::DailyVerification,
        }
    }

    /// Serializes the job into its JSON envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let kind = self.kind().as_str();
        let encoded = match self {
            Self::ProcessTransmutation(p) => serde_json::to_vec(&EnvelopeOut { kind, payload: p }),
            Self::RegisterAudit(p) => serde_json::to_vec(&EnvelopeOut { kind, payload: p }),
            Self::DailyVerification(p) => serde_json::to_vec(&EnvelopeOut { kind, payload: p }),
        };
        encoded.map_err(EnvelopeError::Encode)
    }

    /// Decodes an envelope.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Malformed`]: not a JSON object with a string `type`.
    /// - [`EnvelopeError::UnknownKind`]: `type` names no known job.
    /// - [`EnvelopeError::InvalidPayload`]: `payload` does not match the kind.
    pub fn from_slice(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: EnvelopeIn = serde_json::from_slice(raw).map_err(EnvelopeError::Malformed)?;
        let kind: JobKind = envelope.kind.parse()?;
        let payload = envelope.payload;

        let invalid = |source| EnvelopeError::InvalidPayload { kind, source };
        Ok(match kind {
            JobKind::ProcessTransmutation => {
                Self::ProcessTransmutation(serde_json::from_value(payload).map_err(invalid)?)
            }
            JobKind::RegisterAudit => {
                Self::RegisterAudit(serde_json::from_value(payload).map_err(invalid)?)
            }
            JobKind::DailyVerification => {
                Self::DailyVerification(serde_json::from_value(payload).map_err(invalid)?)
            }
        })
    }
}
