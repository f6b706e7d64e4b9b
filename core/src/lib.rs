//! Core types and search logic for the trykeys license recovery tool.
//!
//! The transports (telnet shell, SCPI web relay) live in their own crates and plug in through
//! the traits in [`transport`].

pub mod bandwidth;
pub mod keys;
pub mod license;
pub mod report;
pub mod search;
pub mod transport;

pub use bandwidth::{parse_bandwidth, BandwidthParseError, BandwidthState, Trial};
pub use keys::{CandidateKeys, KeyListError};
pub use license::License;
pub use report::RunReport;
pub use search::SearchSettings;
pub use transport::{FileContents, ScpiRelay, ScpiReply, ShellProbe};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
