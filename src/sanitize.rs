//! Normalization of untrusted occupancy readings
//!
//! Remote services report their own occupancy, and a misbehaving service can
//! return anything that fits in the wire format. Values above
//! [`MAX_PLAUSIBLE`] are capped so graphs stay renderable, negative values are
//! reset to zero.

use tracing::warn;

/// Largest occupancy value accepted from a probe
pub const MAX_PLAUSIBLE: u32 = 250_000;

/// Outcome of checking a raw reading against the accepted range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitized {
    /// Value was already in range
    Unchanged(u32),

    /// Value exceeded [`MAX_PLAUSIBLE`] and was capped
    Capped(u32),

    /// Value was negative and was reset to zero
    Negative(u32),
}

impl Sanitized {
    /// Classify a raw reading without emitting any warning
    pub fn classify(raw: i64) -> Self {
        if raw > i64::from(MAX_PLAUSIBLE) {
            Sanitized::Capped(MAX_PLAUSIBLE)
        } else if raw < 0 {
            Sanitized::Negative(0)
        } else {
            // in range, fits u32
            Sanitized::Unchanged(raw as u32)
        }
    }

    pub fn value(self) -> u32 {
        match self {
            Sanitized::Unchanged(v) | Sanitized::Capped(v) | Sanitized::Negative(v) => v,
        }
    }
}

/// Clamp a raw reading into `[0, MAX_PLAUSIBLE]`
///
/// Out-of-range readings are logged with the reporting service's name.
pub fn sanitize(service: &str, raw: i64) -> u32 {
    match Sanitized::classify(raw) {
        Sanitized::Unchanged(value) => value,
        Sanitized::Capped(value) => {
            warn!(
                "{service} returned an occupancy of {raw}, capped to {value}; \
                 raise MAX_PLAUSIBLE if this is a legitimate reading"
            );
            value
        }
        Sanitized::Negative(value) => {
            warn!("{service} returned an invalid occupancy of {raw}, setting to {value}");
            value
        }
    }
}
