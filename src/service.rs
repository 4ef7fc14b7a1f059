//! Monitored services and their per-service state
//!
//! The roster is fixed at startup. Each [`Service`] owns its rolling history,
//! its all-time record and the outcome of the latest round. Only the round
//! orchestrator (history, last result, protocol cursor) and the record tracker
//! (record) mutate a service, and never from two rounds at once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::RoundTick;
use crate::config::ServiceConfig;
use crate::history::{RollingHistory, Timestamp};
use crate::messages::ServiceUpdate;
use crate::orchestrator::ProbeOutcome;
use crate::probe::{HttpProbe, Probe, ProbeResult, ProbeTarget};
use crate::records::RecordTracker;
use crate::sanitize::sanitize;

/// Index of a service in the roster
pub type ServiceId = usize;

/// One protocol variant a service may be probed with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVariant {
    pub protocol_id: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Round-robin cursor over a service's supported protocol variants
#[derive(Debug, Clone)]
pub struct ProtocolCycle {
    variants: Vec<ProtocolVariant>,
    cursor: usize,
}

impl ProtocolCycle {
    /// An empty list falls back to the single default variant
    pub fn new(variants: Vec<ProtocolVariant>) -> Self {
        let variants = if variants.is_empty() {
            vec![ProtocolVariant::default()]
        } else {
            variants
        };
        Self { variants, cursor: 0 }
    }

    /// Variant for the upcoming round; advances the cursor
    pub fn next_variant(&mut self) -> ProtocolVariant {
        let variant = self.variants[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.variants.len();
        variant
    }
}

/// All-time highest occupancy of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub value: u32,

    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

/// Outcome of the latest round for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastResult {
    pub online: bool,
    pub value: Option<u32>,
    pub protocol_variant: ProtocolVariant,
    pub error: Option<String>,
}

pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub address: String,
    pub history: RollingHistory,
    pub record: Option<Record>,
    pub last_result: Option<LastResult>,
    pub favicon: Option<String>,
    protocols: ProtocolCycle,
    probe: Arc<dyn Probe>,
}

impl Service {
    pub fn new(
        id: ServiceId,
        name: impl Into<String>,
        address: impl Into<String>,
        variants: Vec<ProtocolVariant>,
        probe: Arc<dyn Probe>,
        graph_duration_ms: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            history: RollingHistory::new(graph_duration_ms),
            record: None,
            last_result: None,
            favicon: None,
            protocols: ProtocolCycle::new(variants),
            probe,
        }
    }

    /// Build a service probed over HTTP from its configuration entry
    pub fn from_config(id: ServiceId, config: &ServiceConfig, graph_duration_ms: i64) -> ProbeResult<Self> {
        let probe = HttpProbe::new(config.online_pointer.clone(), config.favicon_pointer.clone())?;

        Ok(Self::new(
            id,
            config.name.clone(),
            config.address.clone(),
            config.protocol_variants.clone(),
            Arc::new(probe),
            graph_duration_ms,
        ))
    }

    pub fn target(&self) -> ProbeTarget {
        ProbeTarget {
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }

    pub fn probe(&self) -> Arc<dyn Probe> {
        Arc::clone(&self.probe)
    }

    pub(crate) fn next_protocol_variant(&mut self) -> ProtocolVariant {
        self.protocols.next_variant()
    }

    /// Fold one round's probe outcome into this service
    ///
    /// The last result, record and favicon are updated on every round; the
    /// history only when the round is retained.
    pub(crate) fn apply_round(&mut self, tick: RoundTick, outcome: &ProbeOutcome) -> ServiceUpdate {
        let (value, error, favicon) = match &outcome.result {
            Ok(response) => (
                response.value.map(|raw| sanitize(&self.name, raw)),
                None,
                response.favicon.clone(),
            ),
            Err(e) => (None, Some(e.to_string()), None),
        };
        let online = outcome.result.is_ok();

        self.last_result = Some(LastResult {
            online,
            value,
            protocol_variant: outcome.variant.clone(),
            error: error.clone(),
        });

        let mut update = ServiceUpdate {
            id: self.id,
            online,
            value,
            error,
            record: None,
            graph_peak: None,
            favicon: None,
        };

        if let Some(value) = value {
            update.record = RecordTracker::maybe_update(&mut self.record, value, tick.timestamp);
        }

        if favicon.is_some() && favicon != self.favicon {
            self.favicon.clone_from(&favicon);
            update.favicon = favicon;
        }

        if tick.retain {
            let before = self.history.find_peak();
            if self.history.append(tick.timestamp, value) {
                let after = self.history.find_peak();
                if after != before {
                    update.graph_peak = after;
                }
            }
        }

        update
    }
}

/// Convert a millisecond timestamp to whole seconds
pub fn to_seconds(timestamp: Timestamp) -> i64 {
    timestamp.div_euclid(1000)
}
