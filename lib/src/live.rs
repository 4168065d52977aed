//! Contracts for the collaborators a scoring session talks to: durable
//! storage and the live publish/subscribe channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{SaygError, ScoreAsYouGo};

/// Kind of document carried on the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveDataType {
    #[default]
    Sayg,
}

impl fmt::Display for LiveDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sayg => write!(f, "sayg"),
        }
    }
}

/// A message delivered to a live subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// A full replacement snapshot for the subscribed match.
    Update { id: Uuid, data: Box<ScoreAsYouGo> },
    /// Something went wrong on the channel.
    Error { message: String },
}

/// Outcome of a storage write, mirroring the shape the REST API returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl<T> ActionResult<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            errors: Vec::new(),
            warnings: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            result: None,
            errors,
            warnings: Vec::new(),
            messages: Vec::new(),
        }
    }
}

pub type UpsertResult = ActionResult<ScoreAsYouGo>;
pub type DeleteResult = ActionResult<()>;

/// Durable storage for match documents.
///
/// `Err` means the call itself failed (transport, I/O); a storage-level
/// refusal comes back as `Ok` with `success == false`.
pub trait SaygStorage: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Option<ScoreAsYouGo>, SaygError>;

    /// Insert or replace. A document without an id is given one, returned in
    /// `result.id`.
    fn upsert(&self, data: &ScoreAsYouGo) -> Result<UpsertResult, SaygError>;

    fn delete(&self, id: Uuid) -> Result<DeleteResult, SaygError>;
}

pub type LiveHandler = Box<dyn Fn(LiveMessage) + Send + Sync + 'static>;

/// An open subscription. Dropping it without calling `unsubscribe` leaks
/// nothing but may deliver further messages until the transport notices.
pub trait Subscription: Send {
    /// Stop delivery. Idempotent. Once it returns the handler is not
    /// invoked again.
    fn unsubscribe(&mut self);
}

/// Publish/subscribe channel keyed by match id.
pub trait LiveTransport: Send + Sync {
    fn subscribe(
        &self,
        id: Uuid,
        data_type: LiveDataType,
        handler: LiveHandler,
    ) -> Result<Box<dyn Subscription>, SaygError>;

    /// Send a full snapshot. `Ok(false)` means the transport refused it.
    fn publish(
        &self,
        id: Uuid,
        data_type: LiveDataType,
        data: &ScoreAsYouGo,
    ) -> Result<bool, SaygError>;
}
