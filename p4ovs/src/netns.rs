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

//! # Network namespaces acting as hosts (`ip netns`)
//!
//! A namespace is attached to the outside world with a veth pair: `veth_if` lives inside the
//! namespace, `peer_name` stays in the root namespace (and is usually added to a bridge).

use crate::netperf::{self, NetperfRun};
use crate::{Host, Result};

use log::*;

/// A namespace with its veth pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Name of the namespace
    pub name: String,
    /// veth interface inside the namespace
    pub veth_if: String,
    /// veth peer in the root namespace
    pub peer_name: String,
    /// Address of `veth_if` (CIDR)
    pub ip: String,
    /// Optional MAC address of `veth_if`
    pub mac: Option<String>,
}

/// Prefix a command to run it inside the namespace
fn in_ns<'a>(ns: &'a str, cmd: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["ip", "netns", "exec", ns];
    args.extend_from_slice(cmd);
    args
}

/// Create the namespace, the veth pair, configure the inner interface and bring both ends up.
pub fn create(host: &Host, ns: &Namespace) -> Result<()> {
    info!("[{}] create namespace {} ({} <-> {})", host, ns.name, ns.veth_if, ns.peer_name);
    host.exec(&["ip", "netns", "add", &ns.name])?;
    host.exec(&["ip", "link", "add", &ns.veth_if, "type", "veth", "peer", "name", &ns.peer_name])?;
    host.exec(&["ip", "link", "set", &ns.veth_if, "netns", &ns.name])?;
    host.exec(&in_ns(&ns.name, &["ip", "addr", "add", &ns.ip, "dev", &ns.veth_if]))?;
    if let Some(mac) = ns.mac.as_ref() {
        host.exec(&in_ns(&ns.name, &["ip", "link", "set", "dev", &ns.veth_if, "address", mac]))?;
    }
    host.exec(&in_ns(&ns.name, &["ip", "link", "set", "dev", &ns.veth_if, "up"]))?;
    host.exec(&in_ns(&ns.name, &["ip", "link", "set", "dev", "lo", "up"]))?;
    host.exec(&["ip", "link", "set", "dev", &ns.peer_name, "up"])
}

/// Delete the namespace. The veth interface inside it is removed with it.
pub fn delete(host: &Host, ns: &Namespace) -> Result<()> {
    info!("[{}] delete namespace {}", host, ns.name);
    host.exec(&["ip", "netns", "del", &ns.name])
}

/// Disable rx/tx checksum offload on an interface inside the namespace
pub fn ethtool_offload(host: &Host, ns: &str, iface: &str) -> Result<()> {
    info!("[{}] disable offload of {} in {}", host, iface, ns);
    host.exec(&in_ns(ns, &["ethtool", "--offload", iface, "rx", "off", "tx", "off"]))
}

/// Change the MTU of an interface inside the namespace
pub fn set_mtu(host: &Host, ns: &str, iface: &str, mtu: u32) -> Result<()> {
    info!("[{}] set mtu of {} in {} to {}", host, iface, ns, mtu);
    let mtu = mtu.to_string();
    host.exec(&in_ns(ns, &["ip", "link", "set", "dev", iface, "mtu", &mtu]))
}

/// Start netserver inside the namespace
pub fn start_netserver(host: &Host, ns: &str) -> Result<()> {
    info!("[{}] start netserver in {}", host, ns);
    host.exec(&in_ns(ns, &["netserver"]))
}

/// Run a netperf client inside the namespace
pub fn netperf(host: &Host, ns: &str, run: &NetperfRun) -> Result<()> {
    info!("[{}] {} in {}", host, run.command(), ns);
    let args = run.args();
    let cmd = args.iter().map(String::as_str).collect::<Vec<_>>();
    let output = host.run(&in_ns(ns, &cmd))?;
    netperf::check_output(run, &output)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn namespace_prefix() {
        assert_eq!(
            in_ns("VM0", &["netserver"]),
            vec!["ip", "netns", "exec", "VM0", "netserver"]
        );
    }
}
