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

//! # ECMP Load-Balancing Test
//!
//! This crate provisions two local VMs behind a P4-OVS switch and two network namespaces on a
//! remote host, connects both sides with a VXLAN tunnel over an ECMP underlay, and drives netperf
//! traffic through it. It checks that all endpoints can reach each other, and that the packets
//! sent by a VM are accounted for on the ECMP links. Finally, everything is removed again. For
//! simplified usage, check the function [`perform_test`].
//!
//! The test has three entry points, called in order:
//!
//! 1. [`EcmpTest::setup`] loads the configuration and merges the run parameters.
//! 2. [`EcmpTest::run`] creates every device, runs the traffic and verifies the load balancing.
//!    The first failing step of provisioning or traffic aborts the run.
//! 3. [`EcmpTest::teardown`] removes every device that was created, continuing on failure.
//!
//! All failures are recorded in the [`Outcome`].

#![deny(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod ledger;
pub mod outcome;
mod provision;
pub mod retry;
mod teardown;
pub mod testbed;
mod traffic;
pub mod verify;
pub mod vm_conn;

#[cfg(test)]
mod test;

pub use config::{ConfigError, RunParams, TestConfig};
pub use outcome::{Failure, Outcome, Phase};
pub use testbed::{LinuxTestbed, Testbed, VmSession};

use ledger::Ledger;
use verify::LoadBalanceReport;

use log::*;
use serde::Serialize;
use thiserror::Error;

/// # Test Error
///
/// Reason why a run was aborted. The failure is also recorded in the [`Outcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// A provisioning or traffic preparation step failed
    #[error("{step}: {source}")]
    Step {
        /// Description of the step, naming the artifact
        step: String,
        /// Error reported by the testbed
        #[source]
        source: p4ovs::Error,
    },
    /// All attempts of a netperf run failed
    #[error("netperf {test} from {client} to {target} failed after {attempts} attempts: {source}")]
    NetperfExhausted {
        /// VM or namespace running the client
        client: String,
        /// Test name
        test: String,
        /// Destination
        target: String,
        /// Number of attempts
        attempts: usize,
        /// Error of the last attempt
        #[source]
        source: p4ovs::Error,
    },
    /// The configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Record a failed step in the outcome, and turn it into an [`Error`].
pub(crate) fn check<R>(
    outcome: &mut Outcome,
    phase: Phase,
    step: impl Into<String>,
    result: p4ovs::Result<R>,
) -> Result<R, Error> {
    result.map_err(|source| {
        let step = step.into();
        outcome.record(phase, format!("{}: {}", step, source));
        Error::Step { step, source }
    })
}

/// Result of a single (client, test, destination) netperf run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetperfRecord {
    /// VM or namespace running the client
    pub client: String,
    /// Test name
    pub test: String,
    /// Destination
    pub target: String,
    /// Number of attempts made
    pub attempts: usize,
    /// Whether one of the attempts succeeded
    pub success: bool,
}

/// Summary of a test run, that can be stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    /// True if no failure was recorded
    pub passed: bool,
    /// All recorded failures
    pub failures: Vec<Failure>,
    /// All netperf runs
    pub netperf: Vec<NetperfRecord>,
    /// Result of the load-balancing verification, if it was performed
    pub load_balance: Option<LoadBalanceReport>,
}

/// # ECMP Test Case
///
/// Holds the testbed, the configuration, and everything recorded during the run. The VM sessions
/// only live during [`EcmpTest::run`], and are closed before it returns.
///
/// If the test is dropped before [`EcmpTest::teardown`] was called, the teardown is performed
/// while dropping.
#[derive(Debug)]
pub struct EcmpTest<T: Testbed> {
    pub(crate) testbed: T,
    pub(crate) config: TestConfig,
    pub(crate) outcome: Outcome,
    pub(crate) ledger: Ledger,
    pub(crate) netperf_runs: Vec<NetperfRecord>,
    pub(crate) load_balance: Option<LoadBalanceReport>,
}

impl<T: Testbed> EcmpTest<T> {
    /// Create the test with an already resolved configuration
    pub fn new(testbed: T, config: TestConfig) -> Self {
        Self {
            testbed,
            config,
            outcome: Outcome::new(),
            ledger: Ledger::new(),
            netperf_runs: Vec::new(),
            load_balance: None,
        }
    }

    /// Load the configuration file and merge the run parameters.
    pub fn setup(testbed: T, params: &RunParams) -> Result<Self, Error> {
        info!("Loading the configuration from {}", params.config_json.display());
        let config = TestConfig::load(params)?;
        Ok(Self::new(testbed, config))
    }

    /// Provision all devices, run the traffic and verify the load balancing. Returns an error if
    /// the run was aborted. A failed verification does not abort the run, but is recorded in the
    /// outcome.
    ///
    /// The configuration is validated first, such that a configuration that was never resolved
    /// aborts the run before anything is created.
    pub fn run(&mut self) -> Result<(), Error> {
        if let Err(e) = self.config.validate() {
            self.outcome.record(Phase::Provisioning, format!("Invalid configuration: {}", e));
            return Err(e.into());
        }
        let mut sessions: Vec<T::Session> = Vec::with_capacity(self.config.vm.len());
        let result = self.run_with_sessions(&mut sessions);
        info!("close VM telnet sessions");
        for session in sessions {
            let name = session.name().to_string();
            if let Err(e) = session.close() {
                self.outcome
                    .record(Phase::Traffic, format!("Cannot close the session to {}: {}", name, e));
            }
        }
        result
    }

    fn run_with_sessions(&mut self, sessions: &mut Vec<T::Session>) -> Result<(), Error> {
        self.provision(sessions)?;
        self.prepare_traffic(sessions)?;
        self.drive_traffic(sessions)?;
        self.verify_load_balance(sessions)
    }

    /// The resolved configuration
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// All failures recorded so far
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Artifacts that still need to be removed
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The testbed
    pub fn testbed(&self) -> &T {
        &self.testbed
    }

    /// Summary of the run
    pub fn report(&self) -> TestReport {
        TestReport {
            passed: self.outcome.was_successful(),
            failures: self.outcome.failures().to_vec(),
            netperf: self.netperf_runs.clone(),
            load_balance: self.load_balance.clone(),
        }
    }
}

impl<T: Testbed> Drop for EcmpTest<T> {
    fn drop(&mut self) {
        if !self.ledger.is_empty() {
            warn!("{} artifacts were not removed, performing the teardown", self.ledger.len());
            self.teardown();
        }
    }
}

/// # Perform the test
///
/// Run the test on the testbed using the resolved configuration, and always perform the teardown
/// afterwards, even if the run was aborted. An invalid configuration is reported as a provisioning
/// failure, and nothing is created.
pub fn perform_test<T: Testbed>(testbed: T, config: TestConfig) -> TestReport {
    let mut test = EcmpTest::new(testbed, config);
    if let Err(e) = test.run() {
        error!("Test aborted: {}", e);
    }
    test.teardown();
    test.report()
}
