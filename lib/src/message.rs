//! Unified `BusMessage` bus types and the live channel's WebSocket frames.
//!
//! All events flow through a single `broadcast<BusMessage>` channel. Each
//! message carries the global ID of its originator, a timestamp and a typed
//! event. Producers create messages; consumers subscribe and filter.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DeleteResult, LiveDataType, LiveMessage, ScoreAsYouGo, UpsertResult};

// ---------------------------------------------------------------------------
// Top-level message
// ---------------------------------------------------------------------------

/// A single event on the unified bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    #[serde(default)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub event: BusEvent,
}

impl BusMessage {
    /// Create a new message with the current UTC timestamp. Use `.source()`
    /// to attach the originator.
    pub fn new(event: impl Into<BusEvent>) -> Self {
        Self {
            source: String::new(),
            timestamp: Utc::now(),
            event: event.into(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// The typed event payload carried by a `BusMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusEvent {
    /// A full match snapshot published to live observers.
    LiveUpdate(LiveUpdate),
    /// Store mutation request (emitted by the REST handlers and `BusStorage`).
    StorageCommand(StorageCommand),
    /// Store mutation outcome (emitted by SystemActor after processing).
    StorageOutcome(StorageOutcome),
    /// Generic actor status update.
    ActorStatus(ActorState),
    /// Alert for user-visible warn/error conditions.
    Alert(AlertMessage),
}

impl From<LiveUpdate> for BusEvent {
    fn from(update: LiveUpdate) -> Self {
        BusEvent::LiveUpdate(update)
    }
}

impl From<StorageCommand> for BusEvent {
    fn from(cmd: StorageCommand) -> Self {
        BusEvent::StorageCommand(cmd)
    }
}

impl From<StorageOutcome> for BusEvent {
    fn from(outcome: StorageOutcome) -> Self {
        BusEvent::StorageOutcome(outcome)
    }
}

impl From<ActorState> for BusEvent {
    fn from(state: ActorState) -> Self {
        BusEvent::ActorStatus(state)
    }
}

impl From<AlertMessage> for BusEvent {
    fn from(alert: AlertMessage) -> Self {
        BusEvent::Alert(alert)
    }
}

// ---------------------------------------------------------------------------
// LiveUpdate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub id: Uuid,
    #[serde(default)]
    pub data_type: LiveDataType,
    pub data: Box<ScoreAsYouGo>,
}

// ---------------------------------------------------------------------------
// StorageCommand / StorageOutcome: request-reply against the match store
// ---------------------------------------------------------------------------

/// A request to mutate the match store.
///
/// Processed exclusively by `SystemActor`, which owns the store writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCommand {
    /// Opaque correlation ID. When present, SystemActor emits a
    /// `StorageOutcome` with the same ID after processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub action: StorageAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageAction {
    Upsert { data: Box<ScoreAsYouGo> },
    Delete { id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageOutcome {
    pub request_id: String,
    pub reply: StorageReply,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageReply {
    Upserted(UpsertResult),
    Deleted(DeleteResult),
    /// The store could not be written at all (I/O).
    Failed { error: String },
}

// ---------------------------------------------------------------------------
// ActorStatus: generic actor lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    Starting,
    Disconnected,
    Connected,
}

impl fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Actor state emitted on the bus: lifecycle status plus key/value
/// telemetry (bind address, connected clients).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorState {
    pub status: ActorStatus,
    #[serde(default)]
    pub telemetry: HashMap<String, String>,
}

impl ActorState {
    pub fn new(status: ActorStatus, telemetry: HashMap<String, String>) -> Self {
        Self { status, telemetry }
    }
}

// ---------------------------------------------------------------------------
// AlertMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warn,
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warn => write!(f, "warn"),
            AlertLevel::Error => write!(f, "error"),
        }
    }
}

/// A user-visible alert. Info/debug stays in the tracing backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub level: AlertLevel,
    pub message: String,
}

// ---------------------------------------------------------------------------
// WebSocket frames for /api/live
// ---------------------------------------------------------------------------

/// Frames a live client sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Start {
        #[serde(default)]
        name: String,
    },
    Subscribe {
        id: Uuid,
        #[serde(default)]
        data_type: LiveDataType,
    },
    Unsubscribe {
        id: Uuid,
    },
    Publish {
        id: Uuid,
        #[serde(default)]
        data_type: LiveDataType,
        data: Box<ScoreAsYouGo>,
    },
}

/// Frames the live server sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Reply to `start`.
    Init { source_id: String },
    Update { id: Uuid, data: Box<ScoreAsYouGo> },
    Error { message: String },
}

impl ServerFrame {
    /// The subscriber-facing message, if this frame carries one.
    pub fn into_live_message(self) -> Option<LiveMessage> {
        match self {
            ServerFrame::Init { .. } => None,
            ServerFrame::Update { id, data } => Some(LiveMessage::Update { id, data }),
            ServerFrame::Error { message } => Some(LiveMessage::Error { message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn client_frames_parse_from_wire_json() {
        let id = Uuid::new_v4();
        let frame: ClientFrame =
            serde_json::from_str(&format!(r#"{{"type":"subscribe","id":"{id}"}}"#)).unwrap();
        assert_matches!(frame, ClientFrame::Subscribe { id: got, data_type: LiveDataType::Sayg } if got == id);

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"start","name":"board 1"}"#).unwrap();
        assert_matches!(frame, ClientFrame::Start { name } if name == "board 1");
    }

    #[test]
    fn update_frame_becomes_live_message() {
        let id = Uuid::new_v4();
        let sayg = ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501);
        let json = serde_json::to_string(&ServerFrame::Update {
            id,
            data: Box::new(sayg.clone()),
        })
        .unwrap();
        assert!(json.contains(r#""type":"update""#));

        let frame: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(
            frame.into_live_message(),
            Some(LiveMessage::Update {
                id,
                data: Box::new(sayg)
            })
        );
    }

    #[test]
    fn init_frame_is_not_delivered() {
        let frame = ServerFrame::Init {
            source_id: "ws.1".into(),
        };
        assert_eq!(frame.into_live_message(), None);
    }

    #[test]
    fn bus_event_is_tagged_by_kind() {
        let msg = BusMessage::new(AlertMessage {
            level: AlertLevel::Warn,
            message: "store is slow".into(),
        })
        .source("system");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"]["kind"], "alert");
        assert_eq!(json["source"], "system");
    }

    #[test]
    fn storage_replies_parse_with_and_without_a_result() {
        let refused: StorageReply =
            serde_json::from_str(r#"{"type":"upserted","success":false,"errors":["bad legs"]}"#)
                .unwrap();
        assert_matches!(
            refused,
            StorageReply::Upserted(r) if !r.success && r.result.is_none() && r.errors == ["bad legs"]
        );

        let saved = UpsertResult::ok(ScoreAsYouGo::new("Solo", None, 1, 501));
        let json = serde_json::to_string(&StorageReply::Upserted(saved)).unwrap();
        let back: StorageReply = serde_json::from_str(&json).unwrap();
        assert_matches!(back, StorageReply::Upserted(r) if r.result.as_ref().is_some_and(|m| m.your_name == "Solo"));
    }
}
