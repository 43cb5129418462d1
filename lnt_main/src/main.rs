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


use lnt_runtime::config::{parse_client_cred, parse_list, parse_vm_cred};
use lnt_runtime::{perform_test, LinuxTestbed, RunParams, TestConfig};

use clap::Parser;
use log::*;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    // run clap
    let args = CommandLineArguments::parse();

    // initialize the env logger
    pretty_env_logger::init();

    let params = RunParams {
        config_json: args.config,
        pci_bdf: parse_list(&args.pci_bdf),
        vm_location_list: parse_list(&args.vm_location_list),
        vm_cred: args.vm_cred.as_deref().map(parse_vm_cred).transpose()?,
        client_cred: parse_client_cred(&args.client_cred)?,
        remote_port: parse_list(&args.remote_port),
    };
    info!("Loading the configuration from {}", params.config_json.display());
    let config = TestConfig::load(&params)?;

    let report = perform_test(LinuxTestbed::with_console_host(args.console_host), config);

    if let Some(path) = args.json {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!("Report stored in {}", path.display());
    }

    if report.passed {
        Ok(())
    } else {
        Err(Box::new(TestFailed(report.failures.len())))
    }
}

#[derive(Debug)]
struct TestFailed(usize);

impl fmt::Display for TestFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test has FAILED with {} failures", self.0)
    }
}

impl Error for TestFailed {}

/// Runs the ECMP load-balancing test: two local VMs behind the P4-OVS switch send netperf traffic
/// over a VXLAN tunnel to two namespaces on the remote host. The underlay between both hosts is
/// an ECMP route, and the test checks that the traffic is forwarded over the ECMP links.
#[derive(Parser, Debug)]
#[clap(name = "LNT ECMP Test (Binary)", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// JSON configuration of the test
    #[clap(short = 'c', long)]
    config: PathBuf,
    /// PCI addresses of the physical ports, comma separated
    #[clap(long, default_value = "")]
    pci_bdf: String,
    /// Image location of every VM, comma separated
    #[clap(long)]
    vm_location_list: String,
    /// Credentials of all VMs (`username,password`), overriding the configuration
    #[clap(long)]
    vm_cred: Option<String>,
    /// Remote host (`hostname,username,password`)
    #[clap(long)]
    client_cred: String,
    /// Physical ports of the remote host used as ECMP next hops, comma separated
    #[clap(long)]
    remote_port: String,
    /// Store a JSON report of the run in this file
    #[clap(long)]
    json: Option<PathBuf>,
    /// Host on which the VM consoles are exported over telnet
    #[clap(long, default_value = "127.0.0.1")]
    console_host: String,
}
