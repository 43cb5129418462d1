// LNT-ECMP: ECMP Load-Balancing Test over P4-OVS
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # gNMI port configuration (`gnmi-cli`)
//!
//! Ports of the P4-OVS switch are configured with strings of the form
//! `device:physical-device,name:PORT0,pipeline-name:pipe,mtu:1500`. The first two keys identify
//! the port, all others are parameters that are set.

use crate::{CounterSet, Error, Host, Result};

use log::*;
use regex::Regex;
use std::fmt;

/// Name of the gNMI CLI binary
const GNMI_CLI: &str = "gnmi-cli";

/// Parameters of a single gNMI port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnmiParams {
    /// Device type (e.g., `virtual-device` or `physical-device`)
    pub device: String,
    /// Port name
    pub name: String,
    /// All remaining parameters, in order
    pub params: Vec<(String, String)>,
}

impl GnmiParams {
    /// Create new port parameters without any settings
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self { device: device.into(), name: name.into(), params: Vec::new() }
    }

    /// Add a parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Get the value of a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Path that identifies a single key of this port, used for `gnmi-cli get`
    pub fn key_path(&self, key: &str) -> String {
        format!("device:{},name:{},{}", self.device, self.name, key)
    }
}

impl fmt::Display for GnmiParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{},name:{}", self.device, self.name)?;
        for (k, v) in self.params.iter() {
            write!(f, ",{}:{}", k, v)?;
        }
        Ok(())
    }
}

/// Configure all ports, and read back every parameter to check that it was applied.
pub fn set_and_verify(params: &[GnmiParams]) -> Result<()> {
    for p in params {
        info!("gnmi-cli set {}", p);
        Host::Local.exec(&[GNMI_CLI, "set", &p.to_string()])?;
    }
    for p in params {
        for (key, value) in p.params.iter() {
            let path = p.key_path(key);
            let output = Host::Local.run(&[GNMI_CLI, "get", &path])?;
            let applied = parse_value(&output);
            if applied.as_deref() != Some(value.as_str()) {
                error!("gnmi-cli get {}: expected {}, found {:?}", path, value, applied);
                return Err(Error::UnexpectedOutput {
                    cmd: format!("{} get {}", GNMI_CLI, path),
                    reason: format!("value {} was not applied", value),
                });
            }
        }
    }
    Ok(())
}

/// Parse the value of a single key from the output of `gnmi-cli get`, like `string_val: "TAP1"`
/// or `uint_val: 1500`. If the output holds several values, the last one is returned.
pub fn parse_value(output: &str) -> Option<String> {
    let value_re =
        Regex::new(r#"\b(?:string|uint|int|bool|double|float)_val:\s*(?:"([^"]*)"|([^\s}]+))"#)
            .unwrap();
    value_re
        .captures_iter(output)
        .last()
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
}

/// Read all counters of a port
pub fn get_counters(params: &GnmiParams) -> Result<CounterSet> {
    let path = params.key_path("counters");
    let output = Host::Local.run(&[GNMI_CLI, "get", &path])?;
    let counters = parse_counters(&output);
    if counters.is_empty() {
        return Err(Error::UnexpectedOutput {
            cmd: format!("{} get {}", GNMI_CLI, path),
            reason: "no counters found".to_string(),
        });
    }
    Ok(counters)
}

/// Parse the output of `gnmi-cli get ...,counters`. Each value line `uint_val: <n>` belongs to the
/// last `name: "<counter>"` line before it.
pub fn parse_counters(output: &str) -> CounterSet {
    let name_re = Regex::new(r#"name:\s*"([A-Za-z0-9_\-]+)""#).unwrap();
    let value_re = Regex::new(r"uint_val:\s*(\d+)").unwrap();

    let mut counters = CounterSet::new();
    let mut current: Option<String> = None;
    for line in output.lines() {
        if let Some(caps) = name_re.captures_iter(line).last() {
            current = Some(caps[1].to_string());
        }
        if let Some(caps) = value_re.captures(line) {
            match (current.take(), caps[1].parse::<u64>()) {
                (Some(name), Ok(value)) => counters.insert(name, value),
                (None, _) => warn!("gnmi-cli: counter value without a name: {}", line.trim()),
                (Some(name), Err(e)) => warn!("gnmi-cli: invalid value for {}: {}", name, e),
            }
        }
    }
    counters
}
