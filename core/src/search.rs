//! Key search against a live scope.
//!
//! Every step prints to the console log as it goes. Per-request failures are logged through
//! `tracing` and count as "not confirmed"; nothing in here aborts the run.

use crate::bandwidth::{parse_bandwidth, BandwidthState, Trial};
use crate::keys::CandidateKeys;
use crate::license::{key_snippet, License, BANDWIDTH_KEY_PATH};
use crate::report::RunReport;
use crate::transport::{ScpiRelay, ShellProbe};
use std::collections::BTreeMap;
use std::io::{self, Write};
use tracing::{debug, warn};

/// SCPI query for the licensed bandwidth.
pub const QUERY_BANDWIDTH: &str = "PRBD?";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSettings {
    /// Target bandwidth in MHz. `None` disables the bandwidth search.
    pub max_bandwidth: Option<u32>,
}

/// Mutable state of one run.
#[derive(Debug, Default)]
pub struct RunState {
    pub keys: CandidateKeys,
    pub found: BTreeMap<License, String>,
    /// Licenses still to be searched, in order.
    pub pending: Vec<License>,
    pub installed_bandwidth_key: Option<String>,
    pub bandwidth: Option<BandwidthState>,
}

impl RunState {
    pub fn new(keys: CandidateKeys) -> Self {
        RunState { keys, ..Default::default() }
    }

    /// Record `key` for `license`. A recorded key is never replaced and is no longer a candidate.
    fn record(&mut self, license: License, key: &str) {
        self.found.entry(license).or_insert_with(|| key.to_string());
        self.keys.remove(key);
    }
}

/// Run the whole search: survey, bandwidth, then options.
pub fn run<S: ShellProbe, R: ScpiRelay>(
    shell: &mut S,
    relay: &mut R,
    keys: CandidateKeys,
    settings: &SearchSettings,
) -> RunReport {
    let mut state = RunState::new(keys);
    survey_options(shell, &mut state);
    read_installed_bandwidth_key(shell, &mut state);
    if let Some(max) = settings.max_bandwidth {
        prepare_bandwidth(relay, &mut state, max);
    }
    println!(
        "We have {} keys to try for {} options",
        state.keys.len(),
        state.pending.len()
    );
    search_bandwidth(relay, &mut state);
    search_options(shell, relay, &mut state);
    RunReport::new(state.found, settings.max_bandwidth.is_some(), state.bandwidth)
}

/// Probe each option's license file. Licensed options are recorded, missing ones queued.
pub fn survey_options<S: ShellProbe>(shell: &mut S, state: &mut RunState) {
    for license in License::OPTIONS {
        let Some(path) = license.license_path() else { continue };
        let file = match shell.probe(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, %license, "license probe failed");
                println!("Unable to query license file for option '{}'", license);
                continue;
            }
        };
        if file.is_missing() {
            println!("Scope Option '{}' not licensed, will seek key", license);
            state.pending.push(license);
        } else if let Some(key) = file.exists.then(|| key_snippet(&file.content)).flatten() {
            println!("Scope Option '{}' already licensed: {}", license, key);
            state.record(license, &key);
        } else {
            println!("Unknown response from telnet query:\n{}", file.content);
        }
    }
}

/// Read the installed bandwidth key and drop it from the candidates.
pub fn read_installed_bandwidth_key<S: ShellProbe>(shell: &mut S, state: &mut RunState) {
    match shell.probe(BANDWIDTH_KEY_PATH) {
        Ok(file) if file.exists => {
            if let Some(key) = key_snippet(&file.content) {
                state.keys.remove(&key);
                println!("Scope bandwidth license key: {}", key);
                state.installed_bandwidth_key = Some(key);
            }
        }
        Ok(_) => println!("Scope bandwidth license key file not readable"),
        Err(e) => warn!(error = %e, "bandwidth key probe failed"),
    }
}

/// Query the current bandwidth and decide whether a bandwidth search is needed. Without a
/// known installed key a lowering trial could not be undone, so the search is skipped.
pub fn prepare_bandwidth<R: ScpiRelay>(relay: &mut R, state: &mut RunState, max_mhz: u32) {
    let Some(current) = query_bandwidth(relay) else {
        println!("WARNING: Unable to determine current bandwidth. Skipping bandwidth key search.");
        return;
    };
    let bw = BandwidthState::new(current, max_mhz, state.installed_bandwidth_key.clone());
    if bw.at_max() {
        println!("WARNING: Maximum bandwidth already licensed. Skipping key search request.");
    } else if bw.active_key.is_none() {
        println!("WARNING: Installed bandwidth key unknown. Skipping bandwidth key search.");
    } else {
        println!("Scope bandwidth currently licensed: {}M of {}M", current, max_mhz);
        state.pending.insert(0, License::Bandwidth);
    }
    state.bandwidth = Some(bw);
}

/// Current bandwidth as reported by `PRBD?`, or `None` if the reply did not confirm one.
pub fn query_bandwidth<R: ScpiRelay>(relay: &mut R) -> Option<u32> {
    let reply = confirmed(relay, QUERY_BANDWIDTH)?;
    match parse_bandwidth(&reply) {
        Ok(mhz) => Some(mhz),
        Err(e) => {
            warn!(error = %e, "unexpected bandwidth reply");
            None
        }
    }
}

/// Try every candidate as a bandwidth key until the maximum is reached.
pub fn search_bandwidth<R: ScpiRelay>(relay: &mut R, state: &mut RunState) {
    if !state.pending.contains(&License::Bandwidth) {
        return;
    }
    let Some(mut bw) = state.bandwidth.take() else { return };
    let mut accepted = Vec::new();
    let mut reached_max = false;
    let mut progress = Progress::default();

    for (index, key) in state.keys.iter().enumerate() {
        progress.show(License::Bandwidth, index + 1, key);
        if confirmed(relay, &License::Bandwidth.install_command(key)).is_none() {
            continue;
        }
        let Some(reported) = query_bandwidth(relay) else {
            // The trial key may still be installed.
            restore_bandwidth(relay, &bw, key);
            continue;
        };
        match bw.observe(key, reported) {
            Trial::Raised { reached_max: true } => {
                progress.clear();
                println!("Maximum bandwidth ({}M) license key found: {}", bw.max_mhz, key);
                accepted.push(key.clone());
                reached_max = true;
                break;
            }
            Trial::Raised { reached_max: false } => {
                progress.clear();
                println!("{}M Bandwidth license key found: {}", bw.current_mhz, key);
                accepted.push(key.clone());
            }
            Trial::Lowered => {
                debug!(key = %key, reported, "bandwidth dropped");
                restore_bandwidth(relay, &bw, key);
            }
            Trial::Unchanged => {}
        }
    }

    if !reached_max {
        progress.clear();
        println!("Maximum bandwidth ({}M) license key not found!", bw.max_mhz);
    }
    for key in &accepted {
        state.keys.remove(key);
    }
    if reached_max {
        if let Some(key) = bw.active_key.clone() {
            state.record(License::Bandwidth, &key);
        }
    }
    state.bandwidth = Some(bw);
}

/// Reinstall the tracked bandwidth key after `trial` left the scope in an unknown or lower state.
fn restore_bandwidth<R: ScpiRelay>(relay: &mut R, bw: &BandwidthState, trial: &str) {
    match bw.active_key.as_deref() {
        Some(previous) => {
            debug!(key = %trial, restore = %previous, "restoring bandwidth key");
            confirmed(relay, &License::Bandwidth.install_command(previous));
        }
        None => warn!(key = %trial, "no previous bandwidth key to restore"),
    }
}

/// Search each pending feature option; the first key whose license file appears wins.
pub fn search_options<S: ShellProbe, R: ScpiRelay>(shell: &mut S, relay: &mut R, state: &mut RunState) {
    let options: Vec<License> = state.pending.iter().copied().filter(|l| *l != License::Bandwidth).collect();
    for license in options {
        let Some(path) = license.license_path() else { continue };
        let mut hit = None;
        let mut progress = Progress::default();
        for (index, key) in state.keys.iter().enumerate() {
            progress.show(license, index + 1, key);
            if confirmed(relay, &license.install_command(key)).is_none() {
                continue;
            }
            match shell.probe(&path) {
                Ok(file) if file.exists => {
                    hit = Some(key.clone());
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, %license, key = %key, "license probe failed"),
            }
        }
        progress.clear();
        match hit {
            Some(key) => {
                println!("Scope Option '{}' license key found: {}", license, key);
                state.record(license, &key);
            }
            None => println!("Scope Option '{}' license key not found!", license),
        }
    }
}

/// Send `command`; the result text if the relay confirmed it.
fn confirmed<R: ScpiRelay>(relay: &mut R, command: &str) -> Option<String> {
    match relay.send_command(command) {
        Ok(reply) if reply.success => {
            debug!(command, result = %reply.result, "command confirmed");
            Some(reply.result)
        }
        Ok(reply) => {
            debug!(command, result = %reply.result, "command not confirmed");
            None
        }
        Err(e) => {
            warn!(error = %e, command, "command failed");
            None
        }
    }
}

/// Single console line rewritten in place with `\r`.
#[derive(Debug, Default)]
struct Progress {
    width: usize,
}

impl Progress {
    fn line(license: License, index: usize, key: &str) -> String {
        format!("Looking for '{}' key {:08} {}", license, index, key)
    }

    fn show(&mut self, license: License, index: usize, key: &str) {
        let line = Self::line(license, index, key);
        self.width = self.width.max(line.chars().count());
        print!("\r{}", line);
        let _ = io::stdout().flush();
    }

    /// Blank covering the widest line shown so far.
    fn blank(&self) -> String {
        format!("\r{:width$}\r", "", width = self.width)
    }

    fn clear(&mut self) {
        if self.width == 0 {
            return;
        }
        print!("{}", self.blank());
        let _ = io::stdout().flush();
        self.width = 0;
    }
}
