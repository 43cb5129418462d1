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

//! # Open vSwitch bridge and port management (`ovs-vsctl`)

use crate::{Host, Result};

use log::*;

/// Parameters of a VXLAN port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VxlanPort {
    /// Name of the port (e.g., `vxlan1`)
    pub name: String,
    /// Local tunnel endpoint address (without prefix length)
    pub local_ip: String,
    /// Remote tunnel endpoint address (without prefix length)
    pub remote_ip: String,
    /// Destination UDP port
    pub dst_port: u16,
}

/// Create a bridge: `ovs-vsctl add-br <bridge>`
pub fn add_bridge(host: &Host, bridge: &str) -> Result<()> {
    info!("[{}] add bridge {}", host, bridge);
    host.exec(&["ovs-vsctl", "add-br", bridge])
}

/// Delete a bridge, together with all ports attached to it.
pub fn del_bridge(host: &Host, bridge: &str) -> Result<()> {
    info!("[{}] delete bridge {}", host, bridge);
    host.exec(&["ovs-vsctl", "del-br", bridge])
}

/// Attach an existing device to a bridge: `ovs-vsctl add-port <bridge> <port>`
pub fn add_port(host: &Host, bridge: &str, port: &str) -> Result<()> {
    info!("[{}] add port {} to bridge {}", host, port, bridge);
    host.exec(&["ovs-vsctl", "add-port", bridge, port])
}

/// Create a VXLAN port on the bridge
pub fn add_vxlan_port(host: &Host, bridge: &str, vxlan: &VxlanPort) -> Result<()> {
    info!(
        "[{}] add vxlan port {} to bridge {} ({} -> {}, dst_port {})",
        host, vxlan.name, bridge, vxlan.local_ip, vxlan.remote_ip, vxlan.dst_port
    );
    let local_ip = format!("options:local_ip={}", vxlan.local_ip);
    let remote_ip = format!("options:remote_ip={}", vxlan.remote_ip);
    let dst_port = format!("options:dst_port={}", vxlan.dst_port);
    host.exec(&[
        "ovs-vsctl",
        "add-port",
        bridge,
        &vxlan.name,
        "--",
        "set",
        "interface",
        &vxlan.name,
        "type=vxlan",
        &local_ip,
        &remote_ip,
        &dst_port,
    ])
}
