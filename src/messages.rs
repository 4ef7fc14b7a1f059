//! Messages published to downstream consumers
//!
//! Every message serializes as `{ "type": ..., "payload": ... }`. A round
//! produces exactly one [`Message::UpdateServers`], sent after every service
//! in the roster has been updated.

use serde::Serialize;

use crate::history::Peak;
use crate::service::{Record, ServiceId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Message {
    /// Consolidated outcome of one polling round
    UpdateServers(RoundUpdate),
}

/// Payload of [`Message::UpdateServers`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundUpdate {
    /// Shared round timestamp, in seconds
    pub timestamp: i64,

    /// Whether this round's points were added to the rolling histories
    pub update_history_graph: bool,

    /// One entry per service, ordered by service id
    pub updates: Vec<ServiceUpdate>,
}

/// Per-service part of a round update
///
/// Optional fields are only present when they changed during the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceUpdate {
    pub id: ServiceId,
    pub online: bool,
    pub value: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_peak: Option<Peak>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}
