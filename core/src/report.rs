//! End-of-run summary and reboot.

use crate::bandwidth::BandwidthState;
use crate::license::License;
use crate::transport::ShellProbe;
use anyhow::{Context, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub found: BTreeMap<License, String>,
    pub bandwidth_enabled: bool,
    pub bandwidth: Option<BandwidthState>,
}

impl RunReport {
    pub fn new(found: BTreeMap<License, String>, bandwidth_enabled: bool, bandwidth: Option<BandwidthState>) -> Self {
        RunReport { found, bandwidth_enabled, bandwidth }
    }

    /// Bandwidth changed during the run and only takes effect after a restart.
    pub fn reboot_required(&self) -> bool {
        self.bandwidth.as_ref().map_or(false, |bw| bw.changed)
    }

    /// One line for bandwidth (when searched) and one per feature option.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.bandwidth_enabled {
            lines.push(match &self.bandwidth {
                Some(bw) => format!(
                    "{}M bandwidth license key: {}",
                    bw.current_mhz,
                    bw.active_key.as_deref().unwrap_or("unknown")
                ),
                None => "bandwidth license key: not determined".to_string(),
            });
        }
        for license in License::OPTIONS {
            let key = self.found.get(&license).map(String::as_str).unwrap_or("not found");
            lines.push(format!("{} license key: {}", license, key));
        }
        lines
    }

    pub fn print_summary(&self) {
        println!("\n\nSummary of License keys located:");
        for line in self.summary_lines() {
            println!("{}", line);
        }
    }
}

/// Print the summary and reboot the scope if the bandwidth changed. Returns whether a reboot
/// was sent.
pub fn finish<S: ShellProbe>(shell: &mut S, report: &RunReport, allow_reboot: bool) -> Result<bool> {
    report.print_summary();
    if !report.reboot_required() {
        return Ok(false);
    }
    if !allow_reboot {
        println!("\nBandwidth license changed; reboot the scope to activate it.");
        return Ok(false);
    }
    shell.reboot().context("failed to send reboot command")?;
    println!("\nRebooting scope to activate higher bandwidth license.");
    Ok(true)
}
