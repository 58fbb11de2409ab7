//! Command envelope validation
//!
//! Parses inbound command envelopes, rejects malformed or stale input, and
//! normalizes accepted envelopes into ordered actions plus mode/cadence
//! deltas for the dispatch loop.
//!
//! Acknowledgment of the inbound message is conditioned only on a successful
//! decode: a payload that is not JSON at all propagates as an error so the
//! transport collaborator can redeliver, while an envelope that decodes but
//! fails a business rule (missing fields, out-of-order timestamp) is logged
//! and consumed without touching any state.

use crate::state::{CarMode, SensorRate};
use crate::{CarError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One inbound command envelope as it appears on the wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub cloud_timestamp_ms: i64,
    pub mode: String,
    pub sensor_rate: String,
    pub actions: Vec<Map<String, Value>>,
    #[serde(default)]
    pub ball_captured: Option<Value>,
}

/// One normalized, queued unit of work derived from an envelope
///
/// Immutable once enqueued; consumed exactly once by the dispatch loop.
#[derive(Debug, Clone)]
pub struct Action {
    pub timestamp_ms: i64,
    pub kind: String,
    pub value: Value,
}

impl Action {
    /// Numeric action value, accepting JSON numbers and numeric strings
    pub fn value_i64(&self) -> Option<i64> {
        match &self.value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String action value
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// What an accepted envelope sends to the dispatch loop
///
/// Mode and cadence deltas apply before any of the carried actions execute,
/// and apply even when the action list is empty.
#[derive(Debug)]
pub struct CommandBatch {
    pub timestamp_ms: i64,
    pub mode: CarMode,
    pub sensor_rate: SensorRate,
    pub ball_captured: bool,
    pub actions: Vec<Action>,
}

/// Why a decoded envelope was discarded
#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    /// A required field is absent or has the wrong shape
    Malformed(String),
    /// Timestamp not strictly newer than the last accepted envelope;
    /// expected under at-least-once delivery
    Stale { received: i64, last_accepted: i64 },
}

/// Result of validating one decoded envelope
#[derive(Debug)]
pub enum IngestOutcome {
    Accepted(CommandBatch),
    Rejected(Rejection),
}

/// Validates inbound envelopes and tracks the last accepted timestamp
///
/// Lives in the ingestion context; staleness is rejected at the envelope
/// level here, before anything crosses the channel to the dispatch loop.
pub struct EnvelopeValidator {
    last_accepted_timestamp_ms: i64,
}

impl EnvelopeValidator {
    pub fn new() -> Self {
        Self {
            last_accepted_timestamp_ms: 0,
        }
    }

    pub fn last_accepted_timestamp_ms(&self) -> i64 {
        self.last_accepted_timestamp_ms
    }

    /// Validate one inbound payload
    ///
    /// Returns `Err` only when the payload is not JSON; every decoded
    /// envelope, accepted or rejected, is considered consumed.
    pub fn validate(&mut self, payload: &[u8]) -> Result<IngestOutcome> {
        let mut value: Value = serde_json::from_slice(payload)?;

        // Some publishers double-encode the envelope as a JSON string
        if let Value::String(inner) = &value {
            value = serde_json::from_str(inner)?;
        }

        let envelope: CommandEnvelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Discarding malformed envelope: {}", e);
                return Ok(IngestOutcome::Rejected(Rejection::Malformed(e.to_string())));
            }
        };

        if envelope.cloud_timestamp_ms <= self.last_accepted_timestamp_ms {
            warn!(
                "Discarding out-of-order envelope: received {} <= last accepted {}",
                envelope.cloud_timestamp_ms, self.last_accepted_timestamp_ms
            );
            return Ok(IngestOutcome::Rejected(Rejection::Stale {
                received: envelope.cloud_timestamp_ms,
                last_accepted: self.last_accepted_timestamp_ms,
            }));
        }

        self.last_accepted_timestamp_ms = envelope.cloud_timestamp_ms;

        let mode = CarMode::from_wire(&envelope.mode);
        if mode == CarMode::Undefined {
            warn!("Unknown mode '{}', treating as undefined", envelope.mode);
        }
        let sensor_rate = SensorRate::from_wire(&envelope.sensor_rate);
        if sensor_rate == SensorRate::Undefined {
            warn!(
                "Unknown sensor rate '{}', treating as undefined",
                envelope.sensor_rate
            );
        }

        let mut actions = Vec::new();
        for element in &envelope.actions {
            for (kind, value) in element {
                actions.push(Action {
                    timestamp_ms: envelope.cloud_timestamp_ms,
                    kind: kind.clone(),
                    value: value.clone(),
                });
            }
        }

        debug!(
            "Accepted envelope ts={} mode={} rate={} actions={}",
            envelope.cloud_timestamp_ms,
            envelope.mode,
            envelope.sensor_rate,
            actions.len()
        );

        Ok(IngestOutcome::Accepted(CommandBatch {
            timestamp_ms: envelope.cloud_timestamp_ms,
            mode,
            sensor_rate,
            ball_captured: envelope.ball_captured.is_some(),
            actions,
        }))
    }
}

impl Default for EnvelopeValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate one payload and forward an accepted batch to the dispatch loop
///
/// Rejections are logged by the validator and consumed here; decode errors
/// and a closed command channel propagate to the ingestion context.
pub async fn ingest_payload(
    validator: &mut EnvelopeValidator,
    payload: &[u8],
    batches: &mpsc::Sender<CommandBatch>,
) -> Result<()> {
    if let IngestOutcome::Accepted(batch) = validator.validate(payload)? {
        batches
            .send(batch)
            .await
            .map_err(|_| CarError::Transport("command channel closed".to_string()))?;
    }
    Ok(())
}
