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

//! This module is responsible for loading the test configuration and merging it with the run
//! parameters. It also derives the views used by the other modules: gNMI parameters of all
//! ports, the interface address map and the TAP and link port lists.

use p4ovs::gnmi::GnmiParams;
use p4ovs::netns::Namespace;
use p4ovs::netperf::NetperfRun;
use p4ovs::p4ctl::PipelineArtifacts;
use p4ovs::Host;

use log::*;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Name of the TEP device created on the remote host, if the configuration does not name one.
pub const DEFAULT_REMOTE_TEP_INTF: &str = "TEP1";

/// Device type of physical ports, which receive the PCI addresses of the run parameters.
const PHYSICAL_DEVICE: &str = "physical-device";

/// # Configuration Error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file cannot be read
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    /// The configuration file is malformed
    #[error("Cannot parse the configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The credentials string has the wrong format
    #[error("Invalid credentials `{0}`: expected {1}")]
    InvalidCredentials(String, &'static str),
    /// Not every VM has an image location
    #[error("No image location given for VM{0}")]
    MissingVmLocation(usize),
    /// A required value is missing or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parameters supplied by the test runner, which are merged into the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunParams {
    /// Path to the JSON configuration
    pub config_json: PathBuf,
    /// PCI addresses of the physical ports, in order
    pub pci_bdf: Vec<String>,
    /// Image location of every VM, in order
    pub vm_location_list: Vec<String>,
    /// Username and password of all VMs, overriding the configuration file
    pub vm_cred: Option<(String, String)>,
    /// Hostname, username and password of the remote host
    pub client_cred: (String, String, String),
    /// Physical ports of the remote host, used as ECMP next hops
    pub remote_port: Vec<String>,
}

/// Split a comma separated list, dropping empty elements.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|x| !x.is_empty()).map(String::from).collect()
}

/// Parse VM credentials in the form `username,password`.
pub fn parse_vm_cred(s: &str) -> Result<(String, String), ConfigError> {
    match parse_list(s).as_slice() {
        [user, pass] => Ok((user.clone(), pass.clone())),
        _ => Err(ConfigError::InvalidCredentials(s.to_string(), "username,password")),
    }
}

/// Parse the remote host credentials in the form `hostname,username,password`.
pub fn parse_client_cred(s: &str) -> Result<(String, String, String), ConfigError> {
    match parse_list(s).as_slice() {
        [host, user, pass] => Ok((host.clone(), user.clone(), pass.clone())),
        _ => Err(ConfigError::InvalidCredentials(s.to_string(), "hostname,username,password")),
    }
}

/// Strip the prefix length of an address in CIDR notation (`10.0.0.1/24` -> `10.0.0.1`).
pub fn addr_only(cidr: &str) -> &str {
    cidr.split('/').next().unwrap_or(cidr)
}

/// # Test Configuration
///
/// The fully resolved configuration. It is loaded once during setup, and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestConfig {
    /// Name of the P4-OVS switch (used by `ovs-p4ctl`)
    pub switch: String,
    /// Binary pipeline configuration
    pub pb_bin: String,
    /// P4Info file
    pub p4_info: String,
    /// Inputs of the P4 compilation
    pub p4_artifacts: P4ArtifactConfig,
    /// Name of the OVS bridge, used on both hosts
    pub bridge: String,
    /// All switch ports
    pub port: Vec<PortConfig>,
    /// All local VMs. VM `i` is attached to port `i`.
    pub vm: Vec<VmConfig>,
    /// VXLAN tunnel between both hosts
    pub vxlan: VxlanConfig,
    /// ECMP underlay between both hosts
    pub ecmp: EcmpConfig,
    /// Namespaces on the remote host
    #[serde(default)]
    pub net_namespace: Vec<NamespaceConfig>,
    /// P4 table entries
    #[serde(default)]
    pub table: Vec<TableConfig>,
    /// Netperf parameters
    pub netperf: NetperfConfig,
    /// Load-balancing verification parameters
    pub traffic: TrafficConfig,
    /// TEP device on the remote host
    #[serde(default = "default_remote_tep_intf")]
    pub remote_tep_intf: String,
    /// Physical ports of the remote host (from the run parameters)
    #[serde(default)]
    pub remote_port: Vec<String>,
    /// Remote hostname (from the run parameters)
    #[serde(default)]
    pub client_hostname: String,
    /// Remote username (from the run parameters)
    #[serde(default)]
    pub client_username: String,
    /// Remote password (from the run parameters)
    #[serde(default)]
    pub client_password: String,
}

fn default_remote_tep_intf() -> String {
    DEFAULT_REMOTE_TEP_INTF.to_string()
}

/// Inputs of the P4 compilation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct P4ArtifactConfig {
    /// The P4 program
    pub p4_file: String,
    /// Configuration of the pipeline builder
    pub conf_file: String,
    /// Output directory of the compiler
    pub output_dir: String,
    /// Architecture
    #[serde(default = "default_arch")]
    pub arch: String,
}

fn default_arch() -> String {
    "pna".to_string()
}

/// A port of the P4-OVS switch, and the VM interface attached to it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortConfig {
    /// gNMI device (e.g., `virtual-device`)
    pub device: String,
    /// gNMI port name
    pub name: String,
    /// Interface inside the VM
    #[serde(default)]
    pub interface: Option<String>,
    /// Address of the VM interface (CIDR)
    #[serde(default)]
    pub ip: Option<String>,
    /// MAC address of the VM interface
    #[serde(default)]
    pub mac_local: Option<String>,
    /// VLAN ID of the VM on the TAP port
    #[serde(default, deserialize_with = "opt_str_or_num")]
    pub vlan: Option<String>,
    /// All other gNMI parameters (e.g., `pipeline-name`, `control-port`, `port-type`)
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl PortConfig {
    /// gNMI parameters of this port. Keys that are not gNMI parameters (like `id`) are skipped.
    pub fn gnmi_params(&self) -> GnmiParams {
        self.params
            .keys()
            .filter(|k| k.as_str() != "id")
            .filter_map(|k| self.param(k).map(|v| (k, v)))
            .fold(GnmiParams::new(&self.device, &self.name), |p, (k, v)| p.with(k, v))
    }

    /// Value of a gNMI parameter. Numbers are converted to strings, other JSON values are ignored.
    pub fn param(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Returns the `port-type` parameter in upper case
    pub fn port_type(&self) -> Option<String> {
        self.param("port-type").map(|t| t.to_uppercase())
    }

    /// Returns true if the port is configured with a control port
    pub fn has_control_port(&self) -> bool {
        self.params.contains_key("control-port")
    }

    /// Commands that configure the VM interface attached to this port
    pub fn vm_commands(&self) -> Vec<String> {
        match (self.interface.as_ref(), self.ip.as_ref(), self.mac_local.as_ref()) {
            (Some(iface), Some(ip), Some(mac)) => vec![
                format!("ip addr add {} dev {}", ip, iface),
                format!("ip link set dev {} up", iface),
                format!("ip link set dev {} address {}", iface, mac),
            ],
            _ => Vec::new(),
        }
    }

    /// Name of the VLAN device of this port (`vlan<ID>`)
    pub fn vlan_name(&self) -> Option<String> {
        self.vlan.as_ref().map(|id| format!("vlan{}", id))
    }
}

/// A local VM
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VmConfig {
    /// Login name
    pub vm_username: String,
    /// Password
    #[serde(default)]
    pub vm_password: String,
    /// Destinations of the netperf tests started on this VM
    #[serde(default)]
    pub remote_ip: Vec<String>,
    /// Image location (from the run parameters)
    #[serde(default)]
    pub location: String,
    /// Memory of the VM
    #[serde(default = "default_memory")]
    pub memory: String,
}

fn default_memory() -> String {
    "1024M".to_string()
}

/// VXLAN parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VxlanConfig {
    /// Local TEP device
    pub tep_intf: String,
    /// Local and remote TEP address (CIDR)
    pub tep_ip: Vec<String>,
    /// Name of the VXLAN port
    pub vxlan_name: Vec<String>,
    /// Destination UDP port
    #[serde(deserialize_with = "str_or_num_list")]
    pub dst_port: Vec<u16>,
}

impl VxlanConfig {
    /// Local TEP address, without prefix length
    pub fn local_tep(&self) -> &str {
        addr_only(&self.tep_ip[0])
    }

    /// Remote TEP address, without prefix length
    pub fn remote_tep(&self) -> &str {
        addr_only(&self.tep_ip[1])
    }
}

/// ECMP underlay parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EcmpConfig {
    /// Local ECMP ports
    pub local_ports: Vec<String>,
    /// Addresses of the local ECMP ports (CIDR)
    pub local_ports_ip: Vec<String>,
    /// Addresses of the remote ECMP ports (CIDR)
    pub remote_ports_ip: Vec<String>,
}

/// A namespace on the remote host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamespaceConfig {
    /// Name of the namespace
    pub name: String,
    /// Interface inside the namespace
    pub veth_if: String,
    /// Peer in the root namespace, added to the bridge
    pub peer_name: String,
    /// Address of `veth_if` (CIDR)
    pub ip: String,
    /// MAC address of `veth_if`
    #[serde(default)]
    pub mac: Option<String>,
    /// Destinations of the netperf tests started in this namespace
    #[serde(default)]
    pub remote_ip: Vec<String>,
}

impl NamespaceConfig {
    /// Namespace description used by [`p4ovs::netns`]
    pub fn namespace(&self) -> Namespace {
        Namespace {
            name: self.name.clone(),
            veth_if: self.veth_if.clone(),
            peer_name: self.peer_name.clone(),
            ip: self.ip.clone(),
            mac: self.mac.clone(),
        }
    }
}

/// P4 table with the entries to add and to delete
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableConfig {
    /// Scenario description
    #[serde(default)]
    pub description: String,
    /// Switch name
    pub switch: String,
    /// Table name
    pub name: String,
    /// Entries to add
    #[serde(default)]
    pub match_action: Vec<String>,
    /// Entries to delete, `del_action[i]` removes `match_action[i]`
    #[serde(default)]
    pub del_action: Vec<String>,
}

/// Netperf parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetperfConfig {
    /// Tests to run (e.g., `TCP_STREAM`)
    pub testname: Vec<String>,
    /// Test length in seconds
    #[serde(deserialize_with = "str_or_num")]
    pub testlen: u32,
    /// MTU of all traffic endpoints
    #[serde(deserialize_with = "str_or_num")]
    pub mtu: u32,
    /// Additional options
    #[serde(default)]
    pub cmd_option: String,
    /// Accepted difference between sent and forwarded packets
    #[serde(deserialize_with = "str_or_num")]
    pub delta: u64,
}

/// Parameters of the load-balancing verification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// Monitored ECMP links, as index into the ports with a control port
    pub send_port: Vec<usize>,
    /// Index of the sending VM
    #[serde(default)]
    pub vm: usize,
    /// Destination of the measured run. Defaults to the second `remote_ip` of the sending VM.
    #[serde(default)]
    pub target: Option<String>,
}

impl TestConfig {
    /// Parse a configuration from a JSON string. The result is not resolved yet.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load the configuration file, merge the run parameters and validate the result.
    pub fn load(params: &RunParams) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(&params.config_json)
            .map_err(|e| ConfigError::Io(params.config_json.clone(), e))?;
        Self::from_json(&json)?.resolve(params)
    }

    /// Merge the run parameters into the configuration, and check that all values required by
    /// the test are present.
    pub fn resolve(mut self, params: &RunParams) -> Result<Self, ConfigError> {
        // physical ports receive the PCI addresses in order
        let mut pci_bdf = params.pci_bdf.iter();
        for port in self.port.iter_mut().filter(|p| p.device == PHYSICAL_DEVICE) {
            if let Some(bdf) = pci_bdf.next() {
                port.params.insert("pci-bdf".to_string(), Value::String(bdf.clone()));
            }
        }
        if pci_bdf.next().is_some() {
            warn!("More PCI addresses given than physical ports configured");
        }

        for (i, vm) in self.vm.iter_mut().enumerate() {
            vm.location =
                params.vm_location_list.get(i).cloned().ok_or(ConfigError::MissingVmLocation(i))?;
            if let Some((user, pass)) = params.vm_cred.as_ref() {
                vm.vm_username = user.clone();
                vm.vm_password = pass.clone();
            }
        }

        let (hostname, username, password) = params.client_cred.clone();
        self.client_hostname = hostname;
        self.client_username = username;
        self.client_password = password;
        self.remote_port = params.remote_port.clone();

        self.validate()?;
        Ok(self)
    }

    /// Check that the configuration is complete
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.client_hostname.is_empty() {
            return invalid("no remote host given".to_string());
        }
        if self.port.len() < self.vm.len() {
            return invalid(format!("{} VMs but only {} ports", self.vm.len(), self.port.len()));
        }
        if let Some(i) = self.port.iter().take(self.vm.len()).position(|p| {
            p.interface.is_none() || p.ip.is_none() || p.mac_local.is_none() || p.vlan.is_none()
        }) {
            return invalid(format!("port {} needs interface, ip, mac_local and vlan", i));
        }
        if self.tap_ports().is_empty() && !self.vm.is_empty() {
            return invalid("no TAP port configured".to_string());
        }
        if self.vxlan.tep_ip.len() < 2 {
            return invalid("vxlan.tep_ip needs a local and a remote address".to_string());
        }
        if self.vxlan.vxlan_name.is_empty() || self.vxlan.dst_port.is_empty() {
            return invalid("vxlan.vxlan_name and vxlan.dst_port must not be empty".to_string());
        }
        if self.ecmp.local_ports.len() != self.ecmp.local_ports_ip.len() {
            return invalid("ecmp.local_ports and ecmp.local_ports_ip differ in length".to_string());
        }
        if self.remote_port.len() != self.ecmp.remote_ports_ip.len() {
            return invalid(format!(
                "{} remote ports given, but {} remote ECMP addresses configured",
                self.remote_port.len(),
                self.ecmp.remote_ports_ip.len()
            ));
        }
        // every ECMP path pairs a local port with a remote port
        if self.ecmp.local_ports.len() != self.remote_port.len() {
            return invalid(format!(
                "{} local ECMP ports, but {} remote ports",
                self.ecmp.local_ports.len(),
                self.remote_port.len()
            ));
        }
        if self.netperf.testname.is_empty() {
            return invalid("netperf.testname must not be empty".to_string());
        }
        let num_phy = self.gnmi_phy_with_ctrl_port().len();
        if let Some(p) = self.traffic.send_port.iter().find(|p| **p >= num_phy) {
            return invalid(format!("traffic.send_port {} is out of range ({})", p, num_phy));
        }
        if self.vm.get(self.traffic.vm).is_none() {
            return invalid(format!("traffic.vm {} does not exist", self.traffic.vm));
        }
        if self.load_balance_target().is_none() {
            return invalid("no destination for the load-balancing run".to_string());
        }
        for table in self.table.iter() {
            if table.del_action.len() < table.match_action.len() {
                warn!(
                    "table {}: {} entries are added, but only {} are deleted",
                    table.name,
                    table.match_action.len(),
                    table.del_action.len()
                );
            }
        }
        Ok(())
    }

    /// Handle of the remote host
    pub fn remote_host(&self) -> Host {
        Host::remote(&self.client_hostname, &self.client_username, &self.client_password)
    }

    /// Pipeline artifacts to generate
    pub fn pipeline_artifacts(&self) -> PipelineArtifacts {
        PipelineArtifacts {
            p4_file: self.p4_artifacts.p4_file.clone(),
            arch: self.p4_artifacts.arch.clone(),
            output_dir: self.p4_artifacts.output_dir.clone(),
            p4_info: self.p4_info.clone(),
            conf_file: self.p4_artifacts.conf_file.clone(),
            pb_bin: self.pb_bin.clone(),
        }
    }

    /// gNMI parameters of all ports without a control port
    pub fn gnmi_params_simple(&self) -> Vec<GnmiParams> {
        self.port.iter().filter(|p| !p.has_control_port()).map(PortConfig::gnmi_params).collect()
    }

    /// gNMI parameters of all ports configured with a control port
    pub fn gnmi_phy_with_ctrl_port(&self) -> Vec<GnmiParams> {
        self.port.iter().filter(|p| p.has_control_port()).map(PortConfig::gnmi_params).collect()
    }

    /// Map from VM interface to its IPv4 address
    pub fn interface_ipv4(&self) -> BTreeMap<String, String> {
        self.port
            .iter()
            .filter_map(|p| match (p.interface.as_ref(), p.ip.as_ref()) {
                (Some(iface), Some(ip)) => Some((iface.clone(), ip.clone())),
                _ => None,
            })
            .collect()
    }

    /// Names of all TAP ports
    pub fn tap_ports(&self) -> Vec<String> {
        self.ports_of_type("TAP")
    }

    /// Names of all link ports
    pub fn link_ports(&self) -> Vec<String> {
        self.ports_of_type("LINK")
    }

    fn ports_of_type(&self, port_type: &str) -> Vec<String> {
        self.port
            .iter()
            .filter(|p| p.port_type().as_deref() == Some(port_type))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Netperf client run towards `target`, using the configured length and options
    pub fn netperf_run(&self, target: &str, test: &str) -> NetperfRun {
        NetperfRun {
            target: target.to_string(),
            duration: self.netperf.testlen,
            test: test.to_string(),
            option: self.netperf.cmd_option.clone(),
        }
    }

    /// Destination of the measured netperf run
    pub fn load_balance_target(&self) -> Option<String> {
        self.traffic
            .target
            .clone()
            .or_else(|| self.vm.get(self.traffic.vm).and_then(|vm| vm.remote_ip.get(1).cloned()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(u64),
}

impl StrOrNum {
    fn into_string(self) -> String {
        match self {
            StrOrNum::Str(s) => s,
            StrOrNum::Num(n) => n.to_string(),
        }
    }

    fn parse<T: FromStr, E: de::Error>(self) -> Result<T, E>
    where
        T::Err: Display,
    {
        self.into_string().trim().parse().map_err(E::custom)
    }
}

fn str_or_num<'de, D: Deserializer<'de>, T: FromStr>(d: D) -> Result<T, D::Error>
where
    T::Err: Display,
{
    StrOrNum::deserialize(d)?.parse()
}

fn str_or_num_list<'de, D: Deserializer<'de>, T: FromStr>(d: D) -> Result<Vec<T>, D::Error>
where
    T::Err: Display,
{
    Vec::<StrOrNum>::deserialize(d)?.into_iter().map(StrOrNum::parse).collect()
}

fn opt_str_or_num<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<StrOrNum>::deserialize(d)?.map(StrOrNum::into_string))
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = include_str!("../../configs/lnt_ecmp_2vm_2host.json");

    fn params() -> RunParams {
        RunParams {
            config_json: PathBuf::from("lnt_ecmp_2vm_2host.json"),
            pci_bdf: vec!["0000:af:00.0".to_string(), "0000:af:00.1".to_string()],
            vm_location_list: vec!["/images/vm0.qcow2".to_string(), "/images/vm1.qcow2".to_string()],
            vm_cred: None,
            client_cred: ("host2".to_string(), "root".to_string(), "secret".to_string()),
            remote_port: vec!["ens801f0".to_string(), "ens801f1".to_string()],
        }
    }

    fn sample() -> TestConfig {
        TestConfig::from_json(SAMPLE).unwrap().resolve(&params()).unwrap()
    }

    #[test]
    fn parse_run_parameters() {
        assert_eq!(parse_list("a, b,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_vm_cred("root,pw").unwrap(), ("root".to_string(), "pw".to_string()));
        assert!(parse_vm_cred("root").is_err());
        assert_eq!(
            parse_client_cred("host2,root,pw").unwrap(),
            ("host2".to_string(), "root".to_string(), "pw".to_string())
        );
        assert!(parse_client_cred("host2,root").is_err());
        assert_eq!(addr_only("40.1.1.1/24"), "40.1.1.1");
        assert_eq!(addr_only("40.1.1.1"), "40.1.1.1");
    }

    #[test]
    fn resolve_sample() {
        let c = sample();
        assert_eq!(c.vm.len(), 2);
        assert_eq!(c.vm[1].location, "/images/vm1.qcow2");
        assert_eq!(c.vm[0].memory, "1024M");
        assert_eq!(c.client_hostname, "host2");
        assert_eq!(c.remote_port, vec!["ens801f0", "ens801f1"]);
        assert_eq!(c.remote_tep_intf, DEFAULT_REMOTE_TEP_INTF);
        assert_eq!(c.port[1].vlan.as_deref(), Some("2"));
        assert_eq!(c.port[1].vlan_name().as_deref(), Some("vlan2"));
        assert_eq!(c.vxlan.dst_port, vec![4789]);
        assert_eq!(c.vxlan.local_tep(), "40.1.1.1");
        assert_eq!(c.vxlan.remote_tep(), "30.1.1.1");
        assert_eq!(c.netperf.testlen, 10);
        assert_eq!(c.netperf.delta, 5);
        assert_eq!(c.load_balance_target().as_deref(), Some("99.0.0.4"));
    }

    #[test]
    fn pci_addresses_assigned_to_physical_ports() {
        let c = sample();
        let phy = c.gnmi_phy_with_ctrl_port();
        assert_eq!(phy.len(), 2);
        assert_eq!(phy[0].name, "PORT0");
        assert_eq!(phy[0].get("pci-bdf"), Some("0000:af:00.0"));
        assert_eq!(phy[1].get("pci-bdf"), Some("0000:af:00.1"));
        assert_eq!(phy[1].get("control-port"), Some("TAP2"));
        assert!(c.gnmi_params_simple().iter().all(|p| p.get("pci-bdf").is_none()));
    }

    #[test]
    fn derived_views() {
        let c = sample();
        assert_eq!(c.gnmi_params_simple().len(), 5);
        assert_eq!(c.tap_ports(), vec!["TAP0", "TAP1", "TAP2"]);
        assert_eq!(c.link_ports(), vec!["net_vhost0", "net_vhost1", "PORT0", "PORT1"]);
        let ipv4 = c.interface_ipv4();
        assert_eq!(ipv4.len(), 1);
        assert_eq!(ipv4.get("ens3").map(String::as_str), Some("99.0.0.2/24"));
        assert!(c.gnmi_params_simple()[0].get("id").is_none());
    }

    #[test]
    fn vm_commands() {
        let c = sample();
        assert_eq!(
            c.port[0].vm_commands(),
            vec![
                "ip addr add 99.0.0.1/24 dev ens3",
                "ip link set dev ens3 up",
                "ip link set dev ens3 address 00:e8:ca:11:aa:01",
            ]
        );
        assert!(c.port[2].vm_commands().is_empty());
    }

    #[test]
    fn vm_credentials_override() {
        let mut p = params();
        p.vm_cred = Some(("admin".to_string(), "admin123".to_string()));
        let c = TestConfig::from_json(SAMPLE).unwrap().resolve(&p).unwrap();
        assert!(c.vm.iter().all(|vm| vm.vm_username == "admin" && vm.vm_password == "admin123"));
    }

    #[test]
    fn missing_vm_location() {
        let mut p = params();
        p.vm_location_list.pop();
        match TestConfig::from_json(SAMPLE).unwrap().resolve(&p) {
            Err(ConfigError::MissingVmLocation(1)) => {}
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn remote_ports_must_match_ecmp_addresses() {
        let mut p = params();
        p.remote_port.pop();
        assert!(matches!(
            TestConfig::from_json(SAMPLE).unwrap().resolve(&p),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn ecmp_paths_must_pair_up() {
        let mut c = TestConfig::from_json(SAMPLE).unwrap();
        c.ecmp.local_ports.push("TAP0".to_string());
        c.ecmp.local_ports_ip.push("70.1.1.1/24".to_string());
        assert!(matches!(c.resolve(&params()), Err(ConfigError::Invalid(_))));

        let mut p = params();
        p.remote_port.pop();
        let mut c = TestConfig::from_json(SAMPLE).unwrap();
        c.ecmp.remote_ports_ip.pop();
        assert!(matches!(c.resolve(&p), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn send_port_out_of_range() {
        let mut c = TestConfig::from_json(SAMPLE).unwrap();
        c.traffic.send_port = vec![0, 2];
        assert!(matches!(c.resolve(&params()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(TestConfig::from_json("{\"switch\": 3}"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn unreadable_file() {
        let p = RunParams { config_json: PathBuf::from("/nonexistent/config.json"), ..params() };
        assert!(matches!(TestConfig::load(&p), Err(ConfigError::Io(_, _))));
    }
}
