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

//! # Link, address and route management (`iproute2`)

use crate::{Host, Result};

use log::*;
use std::fmt;

/// Bring a device up: `ip link set dev <dev> up`
pub fn set_dev_up(host: &Host, dev: &str) -> Result<()> {
    info!("[{}] bring up {}", host, dev);
    host.exec(&["ip", "link", "set", "dev", dev, "up"])
}

/// Create a device of the given kind (e.g., `dummy`): `ip link add name <name> type <kind>`
pub fn add_dev(host: &Host, name: &str, kind: &str) -> Result<()> {
    info!("[{}] add device {} type {}", host, name, kind);
    host.exec(&["ip", "link", "add", "name", name, "type", kind])
}

/// Create a VLAN device on top of `link`: `ip link add link <link> name <name> type vlan id <id>`
pub fn add_vlan(host: &Host, id: &str, name: &str, link: &str) -> Result<()> {
    info!("[{}] add vlan {} (id {}) on {}", host, name, id, link);
    host.exec(&["ip", "link", "add", "link", link, "name", name, "type", "vlan", "id", id])
}

/// Delete a device: `ip link del <name>`
pub fn del_link(host: &Host, name: &str) -> Result<()> {
    info!("[{}] delete device {}", host, name);
    host.exec(&["ip", "link", "del", name])
}

/// Assign an address (in CIDR notation) to a device
pub fn add_addr(host: &Host, dev: &str, addr: &str) -> Result<()> {
    info!("[{}] add address {} to {}", host, addr, dev);
    host.exec(&["ip", "addr", "add", addr, "dev", dev])
}

/// Remove an address from a device
pub fn del_addr(host: &Host, dev: &str, addr: &str) -> Result<()> {
    info!("[{}] delete address {} from {}", host, addr, dev);
    host.exec(&["ip", "addr", "del", addr, "dev", dev])
}

/// Single next hop of a multipath route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    /// Gateway address
    pub via: String,
    /// Outgoing device
    pub dev: String,
    /// Relative weight of this next hop
    pub weight: u32,
}

/// Route with one or more weighted next hops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipathRoute {
    /// Destination (address or prefix)
    pub dst: String,
    /// All next hops
    pub next_hops: Vec<NextHop>,
}

impl MultipathRoute {
    /// Arguments passed to `ip route add`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["ip".to_string(), "route".to_string(), "add".to_string(), self.dst.clone()];
        for hop in self.next_hops.iter() {
            args.push("nexthop".to_string());
            args.push("via".to_string());
            args.push(hop.via.clone());
            args.push("dev".to_string());
            args.push(hop.dev.clone());
            args.push("weight".to_string());
            args.push(hop.weight.to_string());
        }
        args
    }
}

impl fmt::Display for MultipathRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dst)?;
        for hop in self.next_hops.iter() {
            write!(f, " nexthop via {} dev {} weight {}", hop.via, hop.dev, hop.weight)?;
        }
        Ok(())
    }
}

/// Install a multipath route
pub fn add_route(host: &Host, route: &MultipathRoute) -> Result<()> {
    info!("[{}] add route {}", host, route);
    let args = route.args();
    host.exec(&args.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Remove the route to `dst`
pub fn del_route(host: &Host, dst: &str) -> Result<()> {
    info!("[{}] delete route to {}", host, dst);
    host.exec(&["ip", "route", "del", dst])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn multipath_route_args() {
        let route = MultipathRoute {
            dst: "10.0.0.1".to_string(),
            next_hops: vec![
                NextHop { via: "50.0.0.1".to_string(), dev: "ens785f0".to_string(), weight: 1 },
                NextHop { via: "60.0.0.1".to_string(), dev: "ens785f1".to_string(), weight: 1 },
            ],
        };
        assert_eq!(
            route.args().join(" "),
            "ip route add 10.0.0.1 nexthop via 50.0.0.1 dev ens785f0 weight 1 \
             nexthop via 60.0.0.1 dev ens785f1 weight 1"
        );
        assert_eq!(
            route.to_string(),
            "10.0.0.1 nexthop via 50.0.0.1 dev ens785f0 weight 1 nexthop via 60.0.0.1 dev ens785f1 weight 1"
        );
    }
}
