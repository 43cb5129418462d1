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

//! Provisioning: create every device on the local and the remote host, in order. The first
//! failing step is recorded and aborts the run. Every created device is pushed to the ledger.

use crate::config::addr_only;
use crate::ledger::Artifact;
use crate::testbed::{Testbed, VmSession};
use crate::{check, EcmpTest, Error, Phase};

use p4ovs::iproute::{MultipathRoute, NextHop};
use p4ovs::ovs::VxlanPort;
use p4ovs::Host;

use log::*;
use std::time::Duration;

const PHASE: Phase = Phase::Provisioning;

/// Type of the TEP devices
const TEP_KIND: &str = "dummy";

/// Additional time granted to every VM command, on top of the netperf test length
const SESSION_TIMEOUT_SLACK_S: u64 = 5;

/// Multipath route towards `dst`, with one next hop of weight 1 per (address, device) pair.
/// Addresses are given in CIDR notation.
pub(crate) fn ecmp_route(dst: &str, hop_ips: &[String], devices: &[String]) -> MultipathRoute {
    MultipathRoute {
        dst: addr_only(dst).to_string(),
        next_hops: hop_ips
            .iter()
            .zip(devices.iter())
            .map(|(ip, dev)| NextHop { via: addr_only(ip).to_string(), dev: dev.clone(), weight: 1 })
            .collect(),
    }
}

impl<T: Testbed> EcmpTest<T> {
    /// Create all devices. Sessions to the VMs are pushed into `sessions`, such that the caller
    /// can close them even if provisioning fails.
    pub(crate) fn provision(&mut self, sessions: &mut Vec<T::Session>) -> Result<(), Error> {
        self.provision_local(sessions)?;
        self.provision_remote()?;
        self.provision_routes()
    }

    fn provision_local(&mut self, sessions: &mut Vec<T::Session>) -> Result<(), Error> {
        let EcmpTest { testbed, config, outcome, ledger, .. } = self;
        let local = Host::Local;

        info!("Generate the P4 artifacts");
        check(
            outcome,
            PHASE,
            "Failed to generate P4C artifacts or pb.bin",
            testbed.generate_pipeline(&config.pipeline_artifacts()),
        )?;
        check(
            outcome,
            PHASE,
            "Failed to configure gnmi cli ports",
            testbed.gnmi_set_and_verify(&config.gnmi_params_simple()),
        )?;

        info!("Create {} VMs", config.vm.len());
        for (i, (vm, port)) in config.vm.iter().zip(config.port.iter()).enumerate() {
            check(
                outcome,
                PHASE,
                format!("VM creation failed for VM{} ({})", i, vm.location),
                testbed.create_vm(i, vm, port),
            )?;
        }

        let timeout = Duration::from_secs(config.netperf.testlen as u64 + SESSION_TIMEOUT_SLACK_S);
        for (i, vm) in config.vm.iter().enumerate() {
            let session = check(
                outcome,
                PHASE,
                format!("Cannot open a session to VM{}", i),
                testbed.open_session(i, vm, timeout),
            )?;
            sessions.push(session);
        }

        for (session, port) in sessions.iter_mut().zip(config.port.iter()) {
            info!("Configuring {}", session.name());
            let step = format!("Failed to configure {}", session.name());
            check(outcome, PHASE, step, session.configure(&port.vm_commands()))?;
        }

        let tap = config.tap_ports().into_iter().next();
        if let Some(tap) = tap.as_ref() {
            check(
                outcome,
                PHASE,
                format!("Failed to bring up {}", tap),
                testbed.set_dev_up(&local, tap),
            )?;
        }

        let tep_intf = &config.vxlan.tep_intf;
        check(
            outcome,
            PHASE,
            format!("Failed to add dev {} type {}", tep_intf, TEP_KIND),
            testbed.add_dev(&local, tep_intf, TEP_KIND),
        )?;
        ledger.push(Artifact::LocalTep(tep_intf.clone()));
        check(
            outcome,
            PHASE,
            format!("Failed to configure IP {} for {}", config.vxlan.tep_ip[0], tep_intf),
            testbed.add_addr(&local, tep_intf, &config.vxlan.tep_ip[0]),
        )?;
        for (dev, addr) in config.ecmp.local_ports.iter().zip(config.ecmp.local_ports_ip.iter()) {
            check(
                outcome,
                PHASE,
                format!("Failed to configure IP {} for {}", addr, dev),
                testbed.add_addr(&local, dev, addr),
            )?;
            ledger.push(Artifact::LocalAddr { dev: dev.clone(), addr: addr.clone() });
        }

        check(
            outcome,
            PHASE,
            format!("Failed to set pipe on {}", config.switch),
            testbed.set_pipe(&config.switch, &config.pb_bin, &config.p4_info),
        )?;

        let bridge = &config.bridge;
        check(
            outcome,
            PHASE,
            format!("Failed to add bridge {} to ovs", bridge),
            testbed.add_bridge(&local, bridge),
        )?;
        ledger.push(Artifact::LocalBridge(bridge.clone()));
        check(
            outcome,
            PHASE,
            format!("Failed to bring up {}", bridge),
            testbed.set_dev_up(&local, bridge),
        )?;

        info!("Configure VXLAN");
        let vxlan = VxlanPort {
            name: config.vxlan.vxlan_name[0].clone(),
            local_ip: config.vxlan.local_tep().to_string(),
            remote_ip: config.vxlan.remote_tep().to_string(),
            dst_port: config.vxlan.dst_port[0],
        };
        check(
            outcome,
            PHASE,
            format!("Failed to add vxlan {} to bridge {}", vxlan.name, bridge),
            testbed.add_vxlan_port(&local, bridge, &vxlan),
        )?;

        if let Some(tap) = tap.as_ref() {
            for port in config.port.iter().take(config.vm.len()) {
                let (id, vlan) = match (port.vlan.as_ref(), port.vlan_name()) {
                    (Some(id), Some(vlan)) => (id, vlan),
                    _ => continue,
                };
                check(
                    outcome,
                    PHASE,
                    format!("Failed to add vlan {} to {}", vlan, tap),
                    testbed.add_vlan(&local, id, &vlan, tap),
                )?;
                ledger.push(Artifact::Vlan(vlan.clone()));
                check(
                    outcome,
                    PHASE,
                    format!("Failed to add vlan {} to {}", vlan, bridge),
                    testbed.add_port(&local, bridge, &vlan),
                )?;
                check(
                    outcome,
                    PHASE,
                    format!("Failed to bring up {}", vlan),
                    testbed.set_dev_up(&local, &vlan),
                )?;
            }
        }

        info!("Program rules");
        for table in config.table.iter() {
            info!("Adding {} rules", table.description);
            for (i, entry) in table.match_action.iter().enumerate() {
                check(
                    outcome,
                    PHASE,
                    format!("Failed to add table entry {} to {}", entry, table.name),
                    testbed.add_entry(&table.switch, &table.name, entry),
                )?;
                match table.del_action.get(i) {
                    Some(del_action) => ledger.push(Artifact::TableEntry {
                        switch: table.switch.clone(),
                        table: table.name.clone(),
                        del_action: del_action.clone(),
                    }),
                    None => warn!("No del_action for entry {} of table {}", entry, table.name),
                }
            }
        }

        Ok(())
    }

    fn provision_remote(&mut self) -> Result<(), Error> {
        let EcmpTest { testbed, config, outcome, ledger, .. } = self;
        let remote = config.remote_host();
        let bridge = &config.bridge;

        info!("Configure standard OVS on remote host {}", remote);
        check(
            outcome,
            PHASE,
            format!("Failed to add bridge {} to ovs on {}", bridge, remote),
            testbed.add_bridge(&remote, bridge),
        )?;
        ledger.push(Artifact::RemoteBridge(bridge.clone()));
        check(
            outcome,
            PHASE,
            format!("Failed to bring up {} on {}", bridge, remote),
            testbed.set_dev_up(&remote, bridge),
        )?;

        for ns in config.net_namespace.iter().map(|n| n.namespace()) {
            info!("creating namespace {} on {}", ns.name, remote);
            check(
                outcome,
                PHASE,
                format!("Failed to add namespace {} on {}", ns.name, remote),
                testbed.create_namespace(&remote, &ns),
            )?;
            ledger.push(Artifact::Namespace(ns.clone()));
            check(
                outcome,
                PHASE,
                format!("Failed to add port {} to bridge {} on {}", ns.peer_name, bridge, remote),
                testbed.add_port(&remote, bridge, &ns.peer_name),
            )?;
        }

        info!("Configure vxlan port on remote host {}", remote);
        let vxlan = VxlanPort {
            name: config.vxlan.vxlan_name[0].clone(),
            local_ip: config.vxlan.remote_tep().to_string(),
            remote_ip: config.vxlan.local_tep().to_string(),
            dst_port: config.vxlan.dst_port[0],
        };
        check(
            outcome,
            PHASE,
            format!("Failed to add vxlan {} to bridge {} on {}", vxlan.name, bridge, remote),
            testbed.add_vxlan_port(&remote, bridge, &vxlan),
        )?;

        let tep_intf = &config.remote_tep_intf;
        check(
            outcome,
            PHASE,
            format!("Failed to add dev {} type {} on {}", tep_intf, TEP_KIND, remote),
            testbed.add_dev(&remote, tep_intf, TEP_KIND),
        )?;
        ledger.push(Artifact::RemoteTep(tep_intf.clone()));

        info!("Bring up remote ports");
        check(
            outcome,
            PHASE,
            format!("Failed to bring up {} on {}", tep_intf, remote),
            testbed.set_dev_up(&remote, tep_intf),
        )?;
        check(
            outcome,
            PHASE,
            format!("Failed to configure IP {} for {} on {}", config.vxlan.tep_ip[1], tep_intf, remote),
            testbed.add_addr(&remote, tep_intf, &config.vxlan.tep_ip[1]),
        )?;
        for (dev, addr) in config.remote_port.iter().zip(config.ecmp.remote_ports_ip.iter()) {
            check(
                outcome,
                PHASE,
                format!("Failed to bring up {} on {}", dev, remote),
                testbed.set_dev_up(&remote, dev),
            )?;
            check(
                outcome,
                PHASE,
                format!("Failed to configure IP {} for {} on {}", addr, dev, remote),
                testbed.add_addr(&remote, dev, addr),
            )?;
            ledger.push(Artifact::RemoteAddr { dev: dev.clone(), addr: addr.clone() });
        }

        Ok(())
    }

    fn provision_routes(&mut self) -> Result<(), Error> {
        let EcmpTest { testbed, config, outcome, ledger, .. } = self;
        let remote = config.remote_host();

        // the remote host reaches the local TEP over the local ECMP ports
        let route =
            ecmp_route(&config.vxlan.tep_ip[0], &config.ecmp.local_ports_ip, &config.remote_port);
        check(
            outcome,
            PHASE,
            format!("Failed to add route {} on {}", route, remote),
            testbed.add_route(&remote, &route),
        )?;
        ledger.push(Artifact::RemoteRoute(route.dst.clone()));

        let route = ecmp_route(
            &config.vxlan.tep_ip[1],
            &config.ecmp.remote_ports_ip,
            &config.ecmp.local_ports,
        );
        check(
            outcome,
            PHASE,
            format!("Failed to add route {}", route),
            testbed.add_route(&Host::Local, &route),
        )?;
        ledger.push(Artifact::LocalRoute(route.dst.clone()));

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn route_with_weighted_next_hops() {
        let route = ecmp_route(
            "40.1.1.1/24",
            &["50.1.1.2/24".to_string(), "60.1.1.2/24".to_string()],
            &["ens1".to_string(), "ens2".to_string()],
        );
        assert_eq!(route.dst, "40.1.1.1");
        assert_eq!(
            route.next_hops,
            vec![
                NextHop { via: "50.1.1.2".to_string(), dev: "ens1".to_string(), weight: 1 },
                NextHop { via: "60.1.1.2".to_string(), dev: "ens2".to_string(), weight: 1 },
            ]
        );
    }
}
