//! REST API response types shared between the server and its clients.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ActorStatus;

/// GET /api/status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub actors: HashMap<String, ActorStatusResponse>,
    /// Number of stored matches.
    #[serde(default)]
    pub matches: usize,
    /// Connected live channel clients.
    #[serde(default)]
    pub live_clients: usize,
}

/// Per-actor status within the status response. Also used as the cached
/// per-actor state in the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorStatusResponse {
    #[serde(default)]
    pub name: String,
    pub status: ActorStatus,
    #[serde(default)]
    pub telemetry: HashMap<String, String>,
}
