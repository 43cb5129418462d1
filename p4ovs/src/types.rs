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

//! # Counter Types

use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::TryFrom;

/// Signed difference `after - before` of two counter readings, saturating at the bounds of `i64`.
pub fn signed_delta(after: u64, before: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map(|d| -d).unwrap_or(i64::MIN)
    }
}

/// Named counter values of a single port (e.g., `out-unicast-pkts`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSet(pub BTreeMap<String, u64>);

impl CounterSet {
    /// Create an empty counter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a counter
    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    /// Set the value of a counter
    pub fn insert(&mut self, name: impl Into<String>, value: u64) {
        self.0.insert(name.into(), value);
    }

    /// Returns true if no counter is present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute `self - before` for every counter present in both snapshots. The result is signed,
    /// since a counter reset between the two snapshots would otherwise go unnoticed.
    pub fn delta(&self, before: &CounterSet) -> BTreeMap<String, i64> {
        self.0
            .iter()
            .filter_map(|(name, after)| {
                before.0.get(name).map(|before| (name.clone(), signed_delta(*after, *before)))
            })
            .collect()
    }
}

impl<S: Into<String>> std::iter::FromIterator<(S, u64)> for CounterSet {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// RX and TX statistics of a Linux network interface, as reported by `ip -s link show`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    /// Receive statistics (`bytes`, `packets`, `errors`, ...)
    pub rx: CounterSet,
    /// Transmit statistics (`bytes`, `packets`, `errors`, ...)
    pub tx: CounterSet,
}

impl InterfaceCounters {
    /// Parse the output of `ip -s link show dev <iface>`. Every `RX:` or `TX:` header line is
    /// followed by a line with the values in the same order. Returns `None` if either direction is
    /// missing.
    pub fn parse(output: &str) -> Option<Self> {
        let mut result = Self::default();
        let mut found_rx = false;
        let mut found_tx = false;
        let mut lines = output.lines().map(str::trim);
        while let Some(line) = lines.next() {
            let (target, rest) = if let Some(rest) = line.strip_prefix("RX:") {
                if found_rx {
                    // `ip -s -s` prints a second, detailed RX block
                    continue;
                }
                found_rx = true;
                (&mut result.rx, rest)
            } else if let Some(rest) = line.strip_prefix("TX:") {
                if found_tx {
                    continue;
                }
                found_tx = true;
                (&mut result.tx, rest)
            } else {
                continue;
            };
            let values = lines.next()?;
            for (name, value) in rest.split_whitespace().zip(values.split_whitespace()) {
                target.insert(name.trim_end_matches(':'), value.parse().ok()?);
            }
        }
        if found_rx && found_tx {
            Some(result)
        } else {
            None
        }
    }
}
