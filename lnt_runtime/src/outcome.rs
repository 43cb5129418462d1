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

//! Accumulator of all failures of a test run

use log::*;
use serde::Serialize;
use std::fmt;

/// Phase of the test in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Creating and configuring every device
    Provisioning,
    /// Netserver preparation and netperf runs
    Traffic,
    /// Counter accounting of the load-balancing run
    Verification,
    /// Removing every device
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Provisioning => write!(f, "provisioning"),
            Phase::Traffic => write!(f, "traffic"),
            Phase::Verification => write!(f, "verification"),
            Phase::Teardown => write!(f, "teardown"),
        }
    }
}

/// A single recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Phase of the failure
    pub phase: Phase,
    /// Human readable description, naming the offending artifact
    pub message: String,
}

/// # Test Outcome
///
/// Every failure of the run is appended here. Recording a failure never stops the run by itself;
/// the caller decides whether to abort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    failures: Vec<Failure>,
}

impl Outcome {
    /// Create an outcome without any failure
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure
    pub fn record(&mut self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        error!("FAIL ({}): {}", phase, message);
        self.failures.push(Failure { phase, message });
    }

    /// Returns true if no failure was recorded
    pub fn was_successful(&self) -> bool {
        self.failures.is_empty()
    }

    /// All recorded failures, in order
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Recorded failures of a single phase
    pub fn failures_in(&self, phase: Phase) -> impl Iterator<Item = &Failure> {
        self.failures.iter().filter(move |f| f.phase == phase)
    }
}
