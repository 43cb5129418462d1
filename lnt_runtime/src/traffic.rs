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

//! Traffic phase: prepare the netservers, and run every configured netperf test from the VMs and
//! the namespaces.

use crate::retry::{retry, NETPERF_ATTEMPTS};
use crate::testbed::{Testbed, VmSession};
use crate::{check, EcmpTest, Error, NetperfRecord, Outcome, Phase};

use p4ovs::netperf::NetperfRun;

use log::*;
use std::time::Duration;

const PHASE: Phase = Phase::Traffic;

/// Time for the interfaces to settle before any traffic is sent
pub const QUIESCENCE_DELAY: Duration = Duration::from_secs(10);

/// Run `op` up to [`NETPERF_ATTEMPTS`] times and record the result. If all attempts fail, the
/// failure is recorded and returned as an error.
pub(crate) fn netperf_with_retry(
    outcome: &mut Outcome,
    records: &mut Vec<NetperfRecord>,
    client: &str,
    run: &NetperfRun,
    op: impl FnMut() -> p4ovs::Result<()>,
) -> Result<(), Error> {
    info!("execute {} on {}", run.command(), client);
    let mut record = NetperfRecord {
        client: client.to_string(),
        test: run.test.clone(),
        target: run.target.clone(),
        attempts: 0,
        success: false,
    };
    match retry(NETPERF_ATTEMPTS, op) {
        Ok(((), attempts)) => {
            record.attempts = attempts;
            record.success = true;
            records.push(record);
            Ok(())
        }
        Err(e) => {
            record.attempts = e.attempts;
            records.push(record);
            outcome.record(
                PHASE,
                format!(
                    "netperf {} failed on {} towards {} after {} tries",
                    run.test, client, run.target, e.attempts
                ),
            );
            Err(Error::NetperfExhausted {
                client: client.to_string(),
                test: run.test.clone(),
                target: run.target.clone(),
                attempts: e.attempts,
                source: e.last_error,
            })
        }
    }
}

impl<T: Testbed> EcmpTest<T> {
    /// Prepare the VMs and the namespaces for netperf: disable offloading, change the MTU and
    /// start netserver.
    pub(crate) fn prepare_traffic(&mut self, sessions: &mut [T::Session]) -> Result<(), Error> {
        let EcmpTest { testbed, config, outcome, .. } = self;
        let mtu = config.netperf.mtu;

        info!("prepare netserver on local VM");
        for (session, port) in sessions.iter_mut().zip(config.port.iter()) {
            let name = session.name().to_string();
            let iface = match port.interface.as_ref() {
                Some(iface) => iface,
                None => continue,
            };
            check(
                outcome,
                PHASE,
                format!("failed to set ethtool offload {} on {}", iface, name),
                session.ethtool_offload(iface),
            )?;
            check(
                outcome,
                PHASE,
                format!("failed to change mtu of {} on {}", iface, name),
                session.change_mtu(iface, mtu),
            )?;
            check(
                outcome,
                PHASE,
                format!("netperf is not installed on {}", name),
                session.check_netperf(),
            )?;
            check(
                outcome,
                PHASE,
                format!("failed to start netserver on {}", name),
                session.start_netserver(),
            )?;
        }

        if config.net_namespace.is_empty() {
            return Ok(());
        }

        info!("prepare netserver on remote namespaces");
        let remote = config.remote_host();
        check(
            outcome,
            PHASE,
            format!("netperf is not installed on {}", remote),
            testbed.check_netperf(&remote),
        )?;
        for ns in config.net_namespace.iter() {
            check(
                outcome,
                PHASE,
                format!("failed to set ethtool offload for {} on {}", ns.veth_if, ns.name),
                testbed.ns_ethtool_offload(&remote, &ns.name, &ns.veth_if),
            )?;
            check(
                outcome,
                PHASE,
                format!("failed to change mtu of {} on {}", ns.veth_if, ns.name),
                testbed.ns_change_mtu(&remote, &ns.name, &ns.veth_if, mtu),
            )?;
            check(
                outcome,
                PHASE,
                format!("failed to start netserver on {}", ns.name),
                testbed.ns_start_netserver(&remote, &ns.name),
            )?;
        }

        Ok(())
    }

    /// Wait for the interfaces to settle, and run every netperf test from the VMs, followed by
    /// the namespaces. The first test that fails all attempts aborts the run.
    pub(crate) fn drive_traffic(&mut self, sessions: &mut [T::Session]) -> Result<(), Error> {
        let EcmpTest { testbed, config, outcome, netperf_runs, .. } = self;

        info!("Sleep before sending netperf traffic");
        testbed.sleep(QUIESCENCE_DELAY);

        for (session, vm) in sessions.iter_mut().zip(config.vm.iter()) {
            let name = session.name().to_string();
            for test in config.netperf.testname.iter() {
                for target in vm.remote_ip.iter() {
                    let run = config.netperf_run(target, test);
                    netperf_with_retry(outcome, netperf_runs, &name, &run, || {
                        session.netperf(&run)
                    })?;
                }
            }
        }

        let remote = config.remote_host();
        for ns in config.net_namespace.iter() {
            for test in config.netperf.testname.iter() {
                info!("execute netperf {} on namespace {}", test, ns.name);
                for target in ns.remote_ip.iter() {
                    let run = config.netperf_run(target, test);
                    netperf_with_retry(outcome, netperf_runs, &ns.name, &run, || {
                        testbed.ns_netperf(&remote, &ns.name, &run)
                    })?;
                }
            }
        }

        Ok(())
    }
}
