//! Bandwidth license tracking.
//!
//! A bandwidth key changes what `PRBD?` reports. Trials are judged against the last accepted
//! reading: higher is kept, lower must be undone by reinstalling the tracked key.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BandwidthParseError {
    #[error("no bandwidth value in reply {0:?}")]
    Missing(String),
    #[error("bandwidth value out of range in reply {0:?}")]
    OutOfRange(String),
}

/// Parse a `PRBD?` reply such as `100M` into megahertz.
pub fn parse_bandwidth(reply: &str) -> Result<u32, BandwidthParseError> {
    let trimmed = reply.trim();
    let Some(idx) = trimmed.find('M') else {
        return Err(BandwidthParseError::Missing(reply.to_string()));
    };
    let digits = trimmed[..idx].trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BandwidthParseError::Missing(reply.to_string()));
    }
    digits.parse().map_err(|_| BandwidthParseError::OutOfRange(reply.to_string()))
}

/// Outcome of one bandwidth key trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trial {
    Raised { reached_max: bool },
    Lowered,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthState {
    pub current_mhz: u32,
    pub max_mhz: u32,
    /// Key currently installed on the scope, when known.
    pub active_key: Option<String>,
    /// Set once any trial raised the bandwidth; the scope needs a reboot to apply it.
    pub changed: bool,
}

impl BandwidthState {
    pub fn new(current_mhz: u32, max_mhz: u32, active_key: Option<String>) -> Self {
        BandwidthState { current_mhz, max_mhz, active_key, changed: false }
    }

    pub fn at_max(&self) -> bool {
        self.current_mhz == self.max_mhz
    }

    /// Record the bandwidth reported after installing `key`.
    pub fn observe(&mut self, key: &str, reported_mhz: u32) -> Trial {
        if reported_mhz > self.current_mhz {
            self.current_mhz = reported_mhz;
            self.active_key = Some(key.to_string());
            self.changed = true;
            Trial::Raised { reached_max: reported_mhz == self.max_mhz }
        } else if reported_mhz < self.current_mhz {
            Trial::Lowered
        } else {
            Trial::Unchanged
        }
    }
}
