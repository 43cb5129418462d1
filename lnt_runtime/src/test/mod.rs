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


//! In-memory testbed that records every operation, with injectable failures and counter values.

use crate::config::{PortConfig, RunParams, TestConfig, VmConfig};
use crate::testbed::{Testbed, VmSession};

use p4ovs::gnmi::GnmiParams;
use p4ovs::iproute::MultipathRoute;
use p4ovs::netns::Namespace;
use p4ovs::netperf::NetperfRun;
use p4ovs::ovs::VxlanPort;
use p4ovs::p4ctl::PipelineArtifacts;
use p4ovs::{CounterSet, Error, Host, InterfaceCounters, Result};

use maplit::btreemap;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;


const SAMPLE: &str = include_str!("../../../configs/lnt_ecmp_2vm_2host.json");

pub(crate) fn run_params() -> RunParams {
    RunParams {
        config_json: PathBuf::from("lnt_ecmp_2vm_2host.json"),
        pci_bdf: vec!["0000:af:00.0".to_string(), "0000:af:00.1".to_string()],
        vm_location_list: vec!["/images/vm0.qcow2".to_string(), "/images/vm1.qcow2".to_string()],
        vm_cred: None,
        client_cred: ("host2".to_string(), "root".to_string(), "secret".to_string()),
        remote_port: vec!["ens801f0".to_string(), "ens801f1".to_string()],
    }
}

pub(crate) fn sample_config() -> TestConfig {
    TestConfig::from_json(SAMPLE).unwrap().resolve(&run_params()).unwrap()
}

/// Everything the mock testbed and its sessions share
#[derive(Debug, Default)]
pub(crate) struct State {
    /// Every operation, in order
    pub calls: Vec<String>,
    /// Operations starting with any of these prefixes fail
    pub fail: Vec<String>,
    /// Remaining netperf failures, keyed by `client->target`
    pub netperf_failures: HashMap<String, usize>,
    /// Counter values returned for each switch port, in order
    pub link_counters: HashMap<String, VecDeque<CounterSet>>,
    /// TX packet values returned for the VM interfaces, in order
    pub tx_packets: VecDeque<u64>,
}

impl State {
    fn call(&mut self, call: String) -> Result<()> {
        let failed = self.fail.iter().any(|f| call.starts_with(f.as_str()));
        self.calls.push(call.clone());
        if failed {
            Err(Error::CommandFailed { cmd: call, status: 1, stderr: "injected failure".to_string() })
        } else {
            Ok(())
        }
    }

    fn netperf(&mut self, call: String, client: &str, run: &NetperfRun) -> Result<()> {
        self.call(call.clone())?;
        let key = format!("{}->{}", client, run.target);
        match self.netperf_failures.get_mut(&key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::UnexpectedOutput { cmd: call, reason: "no result row".to_string() })
            }
            _ => Ok(()),
        }
    }

    /// Number of calls starting with the prefix
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Position of the first call starting with the prefix
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.starts_with(prefix))
    }
}

pub(crate) type Shared = Rc<RefCell<State>>;

/// Configure the counters such that VM0 sends `tx` packets, and the ECMP links forward
/// `before -> after` packets.
pub(crate) fn set_counters(state: &Shared, tx: (u64, u64), before: [u64; 2], after: [u64; 2]) {
    let mut s = state.borrow_mut();
    s.tx_packets = vec![tx.0, tx.1].into();
    for (i, port) in ["PORT0", "PORT1"].iter().enumerate() {
        s.link_counters.insert(
            port.to_string(),
            vec![
                CounterSet(btreemap! {"out-unicast-pkts".to_string() => before[i]}),
                CounterSet(btreemap! {"out-unicast-pkts".to_string() => after[i]}),
            ]
            .into(),
        );
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockTestbed {
    state: Shared,
}

impl MockTestbed {
    pub fn new() -> Self {
        // show the log of the test with RUST_LOG
        let _ = pretty_env_logger::try_init();
        Self::default()
    }

    pub fn state(&self) -> Shared {
        self.state.clone()
    }

    fn call(&self, call: String) -> Result<()> {
        self.state.borrow_mut().call(call)
    }
}

#[derive(Debug)]
pub(crate) struct MockSession {
    name: String,
    state: Shared,
}

impl MockSession {
    fn call(&self, what: String) -> Result<()> {
        self.state.borrow_mut().call(format!("{} {}", self.name, what))
    }
}

impl VmSession for MockSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, commands: &[String]) -> Result<()> {
        self.call(format!("configure {}", commands.len()))
    }

    fn ethtool_offload(&mut self, iface: &str) -> Result<()> {
        self.call(format!("offload {}", iface))
    }

    fn change_mtu(&mut self, iface: &str, mtu: u32) -> Result<()> {
        self.call(format!("mtu {} {}", iface, mtu))
    }

    fn check_netperf(&mut self) -> Result<()> {
        self.call("check-netperf".to_string())
    }

    fn start_netserver(&mut self) -> Result<()> {
        self.call("netserver".to_string())
    }

    fn netperf(&mut self, run: &NetperfRun) -> Result<()> {
        let call = format!("{} netperf {} {}", self.name, run.test, run.target);
        self.state.borrow_mut().netperf(call, &self.name, run)
    }

    fn interface_counters(&mut self, iface: &str) -> Result<InterfaceCounters> {
        self.call(format!("counters {}", iface))?;
        let packets = self.state.borrow_mut().tx_packets.pop_front().ok_or_else(|| {
            Error::UnexpectedOutput { cmd: "ip -s link".to_string(), reason: "empty".to_string() }
        })?;
        Ok(InterfaceCounters {
            rx: CounterSet::new(),
            tx: CounterSet(btreemap! {"packets".to_string() => packets}),
        })
    }

    fn close(self) -> Result<()> {
        self.call("close".to_string())
    }
}

impl Testbed for MockTestbed {
    type Session = MockSession;

    fn generate_pipeline(&mut self, _artifacts: &PipelineArtifacts) -> Result<()> {
        self.call("generate-pipeline".to_string())
    }

    fn gnmi_set_and_verify(&mut self, params: &[GnmiParams]) -> Result<()> {
        self.call(format!("gnmi-set {}", params.len()))
    }

    fn port_counters(&mut self, params: &GnmiParams) -> Result<CounterSet> {
        self.call(format!("counters {}", params.name))?;
        self.state
            .borrow_mut()
            .link_counters
            .get_mut(&params.name)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| Error::UnexpectedOutput {
                cmd: format!("gnmi-cli get {}", params),
                reason: "no counters".to_string(),
            })
    }

    fn set_pipe(&mut self, switch: &str, _pb_bin: &str, _p4_info: &str) -> Result<()> {
        self.call(format!("set-pipe {}", switch))
    }

    fn add_entry(&mut self, _switch: &str, table: &str, entry: &str) -> Result<()> {
        self.call(format!("add-entry {} {}", table, entry))
    }

    fn del_entry(&mut self, _switch: &str, table: &str, entry: &str) -> Result<()> {
        self.call(format!("del-entry {} {}", table, entry))
    }

    fn create_vm(&mut self, index: usize, _vm: &VmConfig, _port: &PortConfig) -> Result<()> {
        self.call(format!("create-vm {}", index))
    }

    fn open_session(
        &mut self,
        index: usize,
        _vm: &VmConfig,
        _timeout: Duration,
    ) -> Result<MockSession> {
        self.call(format!("open-session VM{}", index))?;
        Ok(MockSession { name: format!("VM{}", index), state: self.state.clone() })
    }

    fn add_bridge(&mut self, host: &Host, bridge: &str) -> Result<()> {
        self.call(format!("[{}] add-br {}", host, bridge))
    }

    fn del_bridge(&mut self, host: &Host, bridge: &str) -> Result<()> {
        self.call(format!("[{}] del-br {}", host, bridge))
    }

    fn add_port(&mut self, host: &Host, bridge: &str, port: &str) -> Result<()> {
        self.call(format!("[{}] add-port {} {}", host, bridge, port))
    }

    fn add_vxlan_port(&mut self, host: &Host, bridge: &str, vxlan: &VxlanPort) -> Result<()> {
        self.call(format!(
            "[{}] add-vxlan {} {} {} {}",
            host, bridge, vxlan.name, vxlan.local_ip, vxlan.remote_ip
        ))
    }

    fn set_dev_up(&mut self, host: &Host, dev: &str) -> Result<()> {
        self.call(format!("[{}] up {}", host, dev))
    }

    fn add_dev(&mut self, host: &Host, name: &str, kind: &str) -> Result<()> {
        self.call(format!("[{}] add-dev {} {}", host, name, kind))
    }

    fn add_vlan(&mut self, host: &Host, _id: &str, name: &str, link: &str) -> Result<()> {
        self.call(format!("[{}] add-vlan {} {}", host, name, link))
    }

    fn del_link(&mut self, host: &Host, name: &str) -> Result<()> {
        self.call(format!("[{}] del-link {}", host, name))
    }

    fn add_addr(&mut self, host: &Host, dev: &str, addr: &str) -> Result<()> {
        self.call(format!("[{}] add-addr {} {}", host, dev, addr))
    }

    fn del_addr(&mut self, host: &Host, dev: &str, addr: &str) -> Result<()> {
        self.call(format!("[{}] del-addr {} {}", host, dev, addr))
    }

    fn add_route(&mut self, host: &Host, route: &MultipathRoute) -> Result<()> {
        self.call(format!("[{}] add-route {}", host, route))
    }

    fn del_route(&mut self, host: &Host, dst: &str) -> Result<()> {
        self.call(format!("[{}] del-route {}", host, dst))
    }

    fn create_namespace(&mut self, host: &Host, ns: &Namespace) -> Result<()> {
        self.call(format!("[{}] add-ns {}", host, ns.name))
    }

    fn delete_namespace(&mut self, host: &Host, ns: &Namespace) -> Result<()> {
        self.call(format!("[{}] del-ns {}", host, ns.name))
    }

    fn check_netperf(&mut self, host: &Host) -> Result<()> {
        self.call(format!("[{}] check-netperf", host))
    }

    fn ns_ethtool_offload(&mut self, host: &Host, ns: &str, iface: &str) -> Result<()> {
        self.call(format!("[{}] ns-offload {} {}", host, ns, iface))
    }

    fn ns_change_mtu(&mut self, host: &Host, ns: &str, iface: &str, mtu: u32) -> Result<()> {
        self.call(format!("[{}] ns-mtu {} {} {}", host, ns, iface, mtu))
    }

    fn ns_start_netserver(&mut self, host: &Host, ns: &str) -> Result<()> {
        self.call(format!("[{}] ns-netserver {}", host, ns))
    }

    fn ns_netperf(&mut self, host: &Host, ns: &str, run: &NetperfRun) -> Result<()> {
        let call = format!("[{}] ns-netperf {} {} {}", host, ns, run.test, run.target);
        self.state.borrow_mut().netperf(call, ns, run)
    }

    fn sleep(&mut self, duration: Duration) {
        self.state.borrow_mut().calls.push(format!("sleep {}", duration.as_secs()));
    }
}
