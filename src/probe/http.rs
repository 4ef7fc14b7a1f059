//! Probe for services that publish their status as JSON over HTTP(S)
//!
//! The service address is requested with `GET`. The occupancy is read from the
//! JSON body at a configurable [JSON pointer](https://www.rfc-editor.org/rfc/rfc6901)
//! and may be either a number or a numeric string. The protocol variant is
//! passed along in the `X-Protocol-Version` header.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, trace};

use super::{Probe, ProbeError, ProbeResponse, ProbeResult, ProbeTarget};
use crate::service::ProtocolVariant;

/// Default location of the occupancy value in the response body
pub const DEFAULT_ONLINE_POINTER: &str = "/players/online";

/// Header carrying the protocol variant id
pub const PROTOCOL_HEADER: &str = "X-Protocol-Version";

pub struct HttpProbe {
    /// HTTP client (reused across rounds)
    client: reqwest::Client,
    online_pointer: String,
    favicon_pointer: Option<String>,
}

impl HttpProbe {
    pub fn new(online_pointer: impl Into<String>, favicon_pointer: Option<String>) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        Ok(Self {
            client,
            online_pointer: online_pointer.into(),
            favicon_pointer,
        })
    }

    /// Extract occupancy and favicon from a decoded body
    fn read_body(&self, body: &Value) -> ProbeResult<ProbeResponse> {
        let value = match body.pointer(&self.online_pointer) {
            None => return Err(ProbeError::MissingField(self.online_pointer.clone())),
            Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .ok_or_else(|| ProbeError::Decode(format!("unusable number {n}")))?,
            ),
            Some(Value::String(s)) => Some(
                s.trim()
                    .parse::<i64>()
                    .map_err(|e| ProbeError::Decode(format!("'{s}' is not a number: {e}")))?,
            ),
            Some(other) => {
                return Err(ProbeError::Decode(format!(
                    "occupancy has unexpected type: {other}"
                )));
            }
        };

        let favicon = self
            .favicon_pointer
            .as_deref()
            .and_then(|pointer| body.pointer(pointer))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(ProbeResponse { value, favicon })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(skip(self, target, variant), fields(service = %target.name))]
    async fn probe(
        &self,
        target: &ProbeTarget,
        variant: &ProtocolVariant,
        timeout: Duration,
    ) -> ProbeResult<ProbeResponse> {
        trace!("requesting status from {}", target.address);

        let response = self
            .client
            .get(&target.address)
            .header(PROTOCOL_HEADER, variant.protocol_id.to_string())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::Decode(e.to_string()))?;

        self.read_body(&body)
    }
}
