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

//! Record of every artifact created during provisioning, and the order in which they are removed.

use p4ovs::netns::Namespace;

/// A device or setting that was created and needs to be removed during teardown. Ports attached
/// to a bridge (VXLAN, VLAN and namespace peers) are not listed, they are removed together with
/// the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// P4 table entry, stored as the entry that deletes it
    TableEntry {
        /// Switch name
        switch: String,
        /// Table name
        table: String,
        /// Entry passed to `del-entry`
        del_action: String,
    },
    /// Local VLAN device on the TAP port
    Vlan(String),
    /// Local TEP device
    LocalTep(String),
    /// Local route towards the remote TEP
    LocalRoute(String),
    /// Namespace on the remote host, and its peer port
    Namespace(Namespace),
    /// Bridge on the local host
    LocalBridge(String),
    /// Bridge on the remote host
    RemoteBridge(String),
    /// TEP device on the remote host
    RemoteTep(String),
    /// Remote route towards the local TEP
    RemoteRoute(String),
    /// Address of a remote ECMP port
    RemoteAddr {
        /// Device
        dev: String,
        /// Address (CIDR)
        addr: String,
    },
    /// Address of a local ECMP port
    LocalAddr {
        /// Device
        dev: String,
        /// Address (CIDR)
        addr: String,
    },
}

impl Artifact {
    /// Position in the teardown sequence. Artifacts with a smaller rank are removed first.
    fn teardown_rank(&self) -> u8 {
        match self {
            Artifact::TableEntry { .. } => 0,
            Artifact::Vlan(_) => 1,
            Artifact::LocalTep(_) => 2,
            Artifact::LocalRoute(_) => 3,
            Artifact::Namespace(_) => 4,
            Artifact::LocalBridge(_) => 5,
            Artifact::RemoteBridge(_) => 6,
            Artifact::RemoteTep(_) => 7,
            Artifact::RemoteRoute(_) => 8,
            Artifact::RemoteAddr { .. } => 9,
            Artifact::LocalAddr { .. } => 10,
        }
    }
}

/// # Artifact Ledger
///
/// Provisioning pushes every artifact after it was created successfully. Teardown takes all of
/// them out again, such that each artifact is removed exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    artifacts: Vec<Artifact>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created artifact
    pub fn push(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }

    /// All artifacts in the order of creation
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Number of recorded artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Remove all artifacts, sorted in teardown order. Artifacts of the same kind keep the order
    /// in which they were created.
    pub fn drain_teardown_order(&mut self) -> Vec<Artifact> {
        let mut artifacts = std::mem::take(&mut self.artifacts);
        artifacts.sort_by_key(Artifact::teardown_rank);
        artifacts
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn teardown_order() {
        let mut ledger = Ledger::new();
        ledger.push(Artifact::LocalTep("TEP0".to_string()));
        ledger.push(Artifact::LocalAddr { dev: "ens1".to_string(), addr: "50.0.0.1/24".to_string() });
        ledger.push(Artifact::LocalBridge("br-int".to_string()));
        ledger.push(Artifact::Vlan("vlan1".to_string()));
        ledger.push(Artifact::Vlan("vlan2".to_string()));
        ledger.push(Artifact::TableEntry {
            switch: "br0".to_string(),
            table: "t".to_string(),
            del_action: "vlan_id=1".to_string(),
        });
        ledger.push(Artifact::RemoteBridge("br-int".to_string()));

        let order = ledger.drain_teardown_order();
        assert!(ledger.is_empty());
        assert_eq!(
            order,
            vec![
                Artifact::TableEntry {
                    switch: "br0".to_string(),
                    table: "t".to_string(),
                    del_action: "vlan_id=1".to_string(),
                },
                Artifact::Vlan("vlan1".to_string()),
                Artifact::Vlan("vlan2".to_string()),
                Artifact::LocalTep("TEP0".to_string()),
                Artifact::LocalBridge("br-int".to_string()),
                Artifact::RemoteBridge("br-int".to_string()),
                Artifact::LocalAddr { dev: "ens1".to_string(), addr: "50.0.0.1/24".to_string() },
            ]
        );
    }
}
