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

//! Teardown: remove every artifact in the ledger. Failures are recorded, but never stop the
//! teardown.

use crate::ledger::Artifact;
use crate::testbed::Testbed;
use crate::{EcmpTest, Phase};

use p4ovs::Host;

use log::*;

const PHASE: Phase = Phase::Teardown;

impl<T: Testbed> EcmpTest<T> {
    /// Remove every device that was created, and log the verdict of the test. Calling this
    /// function twice does nothing the second time, except for logging the verdict.
    pub fn teardown(&mut self) {
        let artifacts = self.ledger.drain_teardown_order();
        let local = Host::Local;
        let remote = self.config.remote_host();
        info!("Removing {} artifacts", artifacts.len());

        for artifact in artifacts {
            let testbed = &mut self.testbed;
            let (what, result) = match &artifact {
                Artifact::TableEntry { switch, table, del_action } => (
                    format!("table entry {} of {}", del_action, table),
                    testbed.del_entry(switch, table, del_action),
                ),
                Artifact::Vlan(vlan) => (vlan.clone(), testbed.del_link(&local, vlan)),
                Artifact::LocalTep(tep) => (tep.clone(), testbed.del_link(&local, tep)),
                Artifact::LocalRoute(dst) => {
                    (format!("route to {}", dst), testbed.del_route(&local, dst))
                }
                Artifact::Namespace(ns) => {
                    // the peer port is deleted first, such that the bridge does not hold it
                    if let Err(e) = testbed.del_link(&remote, &ns.peer_name) {
                        self.outcome.record(
                            PHASE,
                            format!("Failed to delete {} on {}: {}", ns.peer_name, remote, e),
                        );
                    }
                    (
                        format!("namespace {} on {}", ns.name, remote),
                        testbed.delete_namespace(&remote, ns),
                    )
                }
                Artifact::LocalBridge(bridge) => {
                    (format!("bridge {}", bridge), testbed.del_bridge(&local, bridge))
                }
                Artifact::RemoteBridge(bridge) => (
                    format!("bridge {} on {}", bridge, remote),
                    testbed.del_bridge(&remote, bridge),
                ),
                Artifact::RemoteTep(tep) => {
                    (format!("{} on {}", tep, remote), testbed.del_link(&remote, tep))
                }
                Artifact::RemoteRoute(dst) => (
                    format!("route to {} on {}", dst, remote),
                    testbed.del_route(&remote, dst),
                ),
                Artifact::RemoteAddr { dev, addr } => (
                    format!("ip {} on {} of {}", addr, dev, remote),
                    testbed.del_addr(&remote, dev, addr),
                ),
                Artifact::LocalAddr { dev, addr } => {
                    (format!("ip {} on {}", addr, dev), testbed.del_addr(&local, dev, addr))
                }
            };
            match result {
                Ok(()) => debug!("Deleted {}", what),
                Err(e) => self.outcome.record(PHASE, format!("Failed to delete {}: {}", what, e)),
            }
        }

        if self.outcome.was_successful() {
            info!("Test has PASSED");
        } else {
            error!("Test has FAILED");
        }
    }
}
