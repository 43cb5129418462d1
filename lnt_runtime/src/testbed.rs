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

//! # Testbed abstraction
//!
//! Every operation on the hosts, the switch and the VMs goes through the [`Testbed`] and
//! [`VmSession`] traits. Each operation reports success or failure as a [`p4ovs::Result`].
//! [`LinuxTestbed`] implements them with the real tools.

use crate::config::{PortConfig, VmConfig};
use crate::vm_conn::{VmConnection, VM_CONSOLE_PORT_BASE};

use p4ovs::gnmi::{self, GnmiParams};
use p4ovs::iproute::{self, MultipathRoute};
use p4ovs::netns::{self, Namespace};
use p4ovs::netperf::{self, NetperfRun};
use p4ovs::ovs::{self, VxlanPort};
use p4ovs::p4ctl::{self, PipelineArtifacts};
use p4ovs::{CounterSet, Host, InterfaceCounters, Result};

use log::*;
use std::time::Duration;

/// Persistent command session to a VM
pub trait VmSession {
    /// Name of the VM, used in log messages
    fn name(&self) -> &str;
    /// Execute every command in order, stopping at the first failure
    fn configure(&mut self, commands: &[String]) -> Result<()>;
    /// Disable rx/tx offload of an interface
    fn ethtool_offload(&mut self, iface: &str) -> Result<()>;
    /// Change the MTU of an interface
    fn change_mtu(&mut self, iface: &str, mtu: u32) -> Result<()>;
    /// Check that netperf and netserver are installed
    fn check_netperf(&mut self) -> Result<()>;
    /// Start the netserver daemon
    fn start_netserver(&mut self) -> Result<()>;
    /// Run a netperf client
    fn netperf(&mut self, run: &NetperfRun) -> Result<()>;
    /// Read the RX/TX counters of an interface
    fn interface_counters(&mut self, iface: &str) -> Result<InterfaceCounters>;
    /// Close the session
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// All operations on the local host, the remote host and the switch.
pub trait Testbed {
    /// Session type to the VMs
    type Session: VmSession;

    /// Compile the P4 program and build `pb.bin`
    fn generate_pipeline(&mut self, artifacts: &PipelineArtifacts) -> Result<()>;
    /// Configure switch ports over gNMI and read the values back
    fn gnmi_set_and_verify(&mut self, params: &[GnmiParams]) -> Result<()>;
    /// Read all counters of a switch port
    fn port_counters(&mut self, params: &GnmiParams) -> Result<CounterSet>;
    /// Load the pipeline into the switch
    fn set_pipe(&mut self, switch: &str, pb_bin: &str, p4_info: &str) -> Result<()>;
    /// Add a table entry
    fn add_entry(&mut self, switch: &str, table: &str, entry: &str) -> Result<()>;
    /// Delete a table entry
    fn del_entry(&mut self, switch: &str, table: &str, entry: &str) -> Result<()>;

    /// Start the VM with the given index, attached to `port`
    fn create_vm(&mut self, index: usize, vm: &VmConfig, port: &PortConfig) -> Result<()>;
    /// Open a session to the VM with the given index
    fn open_session(&mut self, index: usize, vm: &VmConfig, timeout: Duration)
        -> Result<Self::Session>;

    /// Create an OVS bridge
    fn add_bridge(&mut self, host: &Host, bridge: &str) -> Result<()>;
    /// Delete an OVS bridge
    fn del_bridge(&mut self, host: &Host, bridge: &str) -> Result<()>;
    /// Attach a device to a bridge
    fn add_port(&mut self, host: &Host, bridge: &str, port: &str) -> Result<()>;
    /// Create a VXLAN port on a bridge
    fn add_vxlan_port(&mut self, host: &Host, bridge: &str, vxlan: &VxlanPort) -> Result<()>;

    /// Bring a device up
    fn set_dev_up(&mut self, host: &Host, dev: &str) -> Result<()>;
    /// Create a device of the given kind
    fn add_dev(&mut self, host: &Host, name: &str, kind: &str) -> Result<()>;
    /// Create a VLAN device on top of `link`
    fn add_vlan(&mut self, host: &Host, id: &str, name: &str, link: &str) -> Result<()>;
    /// Delete a device
    fn del_link(&mut self, host: &Host, name: &str) -> Result<()>;
    /// Assign an address to a device
    fn add_addr(&mut self, host: &Host, dev: &str, addr: &str) -> Result<()>;
    /// Remove an address from a device
    fn del_addr(&mut self, host: &Host, dev: &str, addr: &str) -> Result<()>;
    /// Install a multipath route
    fn add_route(&mut self, host: &Host, route: &MultipathRoute) -> Result<()>;
    /// Remove a route
    fn del_route(&mut self, host: &Host, dst: &str) -> Result<()>;

    /// Create a namespace with its veth pair
    fn create_namespace(&mut self, host: &Host, ns: &Namespace) -> Result<()>;
    /// Delete a namespace
    fn delete_namespace(&mut self, host: &Host, ns: &Namespace) -> Result<()>;
    /// Check that netperf is installed on the host
    fn check_netperf(&mut self, host: &Host) -> Result<()>;
    /// Disable rx/tx offload of an interface inside a namespace
    fn ns_ethtool_offload(&mut self, host: &Host, ns: &str, iface: &str) -> Result<()>;
    /// Change the MTU of an interface inside a namespace
    fn ns_change_mtu(&mut self, host: &Host, ns: &str, iface: &str, mtu: u32) -> Result<()>;
    /// Start netserver inside a namespace
    fn ns_start_netserver(&mut self, host: &Host, ns: &str) -> Result<()>;
    /// Run a netperf client inside a namespace
    fn ns_netperf(&mut self, host: &Host, ns: &str, run: &NetperfRun) -> Result<()>;

    /// Wait for the given duration
    fn sleep(&mut self, duration: Duration);
}

/// # Linux Testbed
///
/// Implements the [`Testbed`] with `ovs-vsctl`, `ovs-p4ctl`, `gnmi-cli`, `iproute2` and qemu.
/// VM consoles are reached over telnet on `console_host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxTestbed {
    console_host: String,
}

impl Default for LinuxTestbed {
    fn default() -> Self {
        Self { console_host: "127.0.0.1".to_string() }
    }
}

impl LinuxTestbed {
    /// Create a new testbed, with the VM consoles on localhost
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new testbed, with the VM consoles exported on `console_host`
    pub fn with_console_host(console_host: impl Into<String>) -> Self {
        Self { console_host: console_host.into() }
    }
}

/// Command line to start the VM with the given index. The VM is attached to the vhost-user socket
/// of its port, and its serial console is exported over telnet.
pub fn qemu_command(index: usize, vm: &VmConfig, port: &PortConfig) -> Vec<String> {
    let mut cmd = vec![
        "qemu-system-x86_64".to_string(),
        "-daemonize".to_string(),
        "-enable-kvm".to_string(),
        "-smp".to_string(),
        "2".to_string(),
        "-m".to_string(),
        vm.memory.clone(),
        "-cpu".to_string(),
        "host".to_string(),
        "-display".to_string(),
        "none".to_string(),
        "-name".to_string(),
        format!("VM{}", index),
        "-hda".to_string(),
        vm.location.clone(),
        "-object".to_string(),
        format!("memory-backend-file,id=mem,size={},mem-path=/dev/hugepages,share=on", vm.memory),
        "-mem-prealloc".to_string(),
        "-numa".to_string(),
        "node,memdev=mem".to_string(),
    ];
    if let Some(socket) = port.param("socket-path") {
        cmd.extend(vec![
            "-chardev".to_string(),
            format!("socket,id=char{},path={}", index, socket),
            "-netdev".to_string(),
            format!("type=vhost-user,id=netdev{},chardev=char{},vhostforce", index, index),
            "-device".to_string(),
            format!("virtio-net-pci,mac={},netdev=netdev{}", vm_nic_mac(index), index),
        ]);
    }
    cmd.push("-serial".to_string());
    cmd.push(format!("telnet::{},server,nowait", VM_CONSOLE_PORT_BASE as usize + index));
    cmd
}

/// MAC address qemu assigns to the vhost-user NIC of a VM
fn vm_nic_mac(index: usize) -> String {
    format!("52:54:00:00:00:{:02x}", (index + 1) % 256)
}

impl Testbed for LinuxTestbed {
    type Session = VmConnection;

    fn generate_pipeline(&mut self, artifacts: &PipelineArtifacts) -> Result<()> {
        artifacts.generate()
    }

    fn gnmi_set_and_verify(&mut self, params: &[GnmiParams]) -> Result<()> {
        gnmi::set_and_verify(params)
    }

    fn port_counters(&mut self, params: &GnmiParams) -> Result<CounterSet> {
        gnmi::get_counters(params)
    }

    fn set_pipe(&mut self, switch: &str, pb_bin: &str, p4_info: &str) -> Result<()> {
        p4ctl::set_pipe(switch, pb_bin, p4_info)
    }

    fn add_entry(&mut self, switch: &str, table: &str, entry: &str) -> Result<()> {
        p4ctl::add_entry(switch, table, entry)
    }

    fn del_entry(&mut self, switch: &str, table: &str, entry: &str) -> Result<()> {
        p4ctl::del_entry(switch, table, entry)
    }

    fn create_vm(&mut self, index: usize, vm: &VmConfig, port: &PortConfig) -> Result<()> {
        info!("Starting VM{} from {}", index, vm.location);
        let cmd = qemu_command(index, vm, port);
        Host::Local.exec(&cmd.iter().map(String::as_str).collect::<Vec<_>>())
    }

    fn open_session(
        &mut self,
        index: usize,
        vm: &VmConfig,
        timeout: Duration,
    ) -> Result<VmConnection> {
        VmConnection::new(
            format!("VM{}", index),
            &self.console_host,
            VM_CONSOLE_PORT_BASE + index as u16,
            &vm.vm_username,
            &vm.vm_password,
            timeout,
        )
    }

    fn add_bridge(&mut self, host: &Host, bridge: &str) -> Result<()> {
        ovs::add_bridge(host, bridge)
    }

    fn del_bridge(&mut self, host: &Host, bridge: &str) -> Result<()> {
        ovs::del_bridge(host, bridge)
    }

    fn add_port(&mut self, host: &Host, bridge: &str, port: &str) -> Result<()> {
        ovs::add_port(host, bridge, port)
    }

    fn add_vxlan_port(&mut self, host: &Host, bridge: &str, vxlan: &VxlanPort) -> Result<()> {
        ovs::add_vxlan_port(host, bridge, vxlan)
    }

    fn set_dev_up(&mut self, host: &Host, dev: &str) -> Result<()> {
        iproute::set_dev_up(host, dev)
    }

    fn add_dev(&mut self, host: &Host, name: &str, kind: &str) -> Result<()> {
        iproute::add_dev(host, name, kind)
    }

    fn add_vlan(&mut self, host: &Host, id: &str, name: &str, link: &str) -> Result<()> {
        iproute::add_vlan(host, id, name, link)
    }

    fn del_link(&mut self, host: &Host, name: &str) -> Result<()> {
        iproute::del_link(host, name)
    }

    fn add_addr(&mut self, host: &Host, dev: &str, addr: &str) -> Result<()> {
        iproute::add_addr(host, dev, addr)
    }

    fn del_addr(&mut self, host: &Host, dev: &str, addr: &str) -> Result<()> {
        iproute::del_addr(host, dev, addr)
    }

    fn add_route(&mut self, host: &Host, route: &MultipathRoute) -> Result<()> {
        iproute::add_route(host, route)
    }

    fn del_route(&mut self, host: &Host, dst: &str) -> Result<()> {
        iproute::del_route(host, dst)
    }

    fn create_namespace(&mut self, host: &Host, ns: &Namespace) -> Result<()> {
        netns::create(host, ns)
    }

    fn delete_namespace(&mut self, host: &Host, ns: &Namespace) -> Result<()> {
        netns::delete(host, ns)
    }

    fn check_netperf(&mut self, host: &Host) -> Result<()> {
        netperf::check_installed(host)
    }

    fn ns_ethtool_offload(&mut self, host: &Host, ns: &str, iface: &str) -> Result<()> {
        netns::ethtool_offload(host, ns, iface)
    }

    fn ns_change_mtu(&mut self, host: &Host, ns: &str, iface: &str, mtu: u32) -> Result<()> {
        netns::set_mtu(host, ns, iface, mtu)
    }

    fn ns_start_netserver(&mut self, host: &Host, ns: &str) -> Result<()> {
        netns::start_netserver(host, ns)
    }

    fn ns_netperf(&mut self, host: &Host, ns: &str, run: &NetperfRun) -> Result<()> {
        netns::netperf(host, ns, run)
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn qemu_command_line() {
        let vm = VmConfig {
            vm_username: "root".to_string(),
            vm_password: "password".to_string(),
            remote_ip: vec![],
            location: "/images/vm1.qcow2".to_string(),
            memory: "1024M".to_string(),
        };
        let mut params = BTreeMap::new();
        params.insert("socket-path".to_string(), serde_json::json!("/tmp/vhost-user-1"));
        let port = PortConfig {
            device: "virtual-device".to_string(),
            name: "net_vhost1".to_string(),
            interface: Some("ens3".to_string()),
            ip: Some("99.0.0.2/24".to_string()),
            mac_local: Some("00:e8:ca:11:bb:01".to_string()),
            vlan: Some("2".to_string()),
            params,
        };
        let cmd = qemu_command(1, &vm, &port);
        assert_eq!(cmd[0], "qemu-system-x86_64");
        assert!(cmd.contains(&"/images/vm1.qcow2".to_string()));
        assert!(cmd.contains(&"socket,id=char1,path=/tmp/vhost-user-1".to_string()));
        assert_eq!(cmd.last().unwrap(), "telnet::6551,server,nowait");
    }
}
