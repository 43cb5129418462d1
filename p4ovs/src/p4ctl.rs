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

//! # P4 pipeline control (`ovs-p4ctl`) and pipeline artifact generation

use crate::{Host, Result};

use log::*;
use std::path::Path;

/// Load a pipeline into the switch: `ovs-p4ctl set-pipe <switch> <pb.bin> <p4info>`
pub fn set_pipe(switch: &str, pb_bin: &str, p4_info: &str) -> Result<()> {
    info!("set pipeline of {} to {} ({})", switch, pb_bin, p4_info);
    Host::Local.exec(&["ovs-p4ctl", "set-pipe", switch, pb_bin, p4_info])
}

/// Add a match-action entry to a table, e.g. `"vlan_id=1,action=linux_networking_control.pop_vlan(1)"`
pub fn add_entry(switch: &str, table: &str, entry: &str) -> Result<()> {
    debug!("add entry to {}: {}", table, entry);
    Host::Local.exec(&["ovs-p4ctl", "add-entry", switch, table, entry])
}

/// Delete a table entry. The entry only contains the match fields.
pub fn del_entry(switch: &str, table: &str, entry: &str) -> Result<()> {
    debug!("delete entry from {}: {}", table, entry);
    Host::Local.exec(&["ovs-p4ctl", "del-entry", switch, table, entry])
}

/// Inputs and outputs of the P4 compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArtifacts {
    /// The P4 program
    pub p4_file: String,
    /// Architecture passed to the compiler (`pna` or `psa`)
    pub arch: String,
    /// Directory for the compiler outputs (`bf-rt.json`, `context.json`, `pipe.spec`)
    pub output_dir: String,
    /// P4Info file written by the compiler
    pub p4_info: String,
    /// Configuration file consumed by the pipeline builder
    pub conf_file: String,
    /// Binary pipeline configuration written by the pipeline builder (`pb.bin`)
    pub pb_bin: String,
}

impl PipelineArtifacts {
    /// Command line of the P4 compiler
    pub fn compile_command(&self) -> Vec<String> {
        let out = Path::new(&self.output_dir);
        vec![
            "p4c-dpdk".to_string(),
            "--arch".to_string(),
            self.arch.clone(),
            "--target".to_string(),
            "dpdk".to_string(),
            "--p4runtime-files".to_string(),
            self.p4_info.clone(),
            "--bf-rt-schema".to_string(),
            out.join("bf-rt.json").display().to_string(),
            "--context".to_string(),
            out.join("pipe").join("context.json").display().to_string(),
            "-o".to_string(),
            out.join("pipe").join(format!("{}.spec", self.program_name())).display().to_string(),
            self.p4_file.clone(),
        ]
    }

    /// Command line of the pipeline builder
    pub fn build_command(&self) -> Vec<String> {
        vec![
            "tdi_pipeline_builder".to_string(),
            format!("--p4c_conf_file={}", self.conf_file),
            format!("--bf_pipeline_config_binary_file={}", self.pb_bin),
        ]
    }

    /// Name of the P4 program, without directory and extension
    pub fn program_name(&self) -> String {
        Path::new(&self.p4_file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "pipe".to_string())
    }

    /// Compile the P4 program and build the binary pipeline (`pb.bin`)
    pub fn generate(&self) -> Result<()> {
        info!("Compiling {} ({})", self.p4_file, self.arch);
        let compile = self.compile_command();
        Host::Local.exec(&compile.iter().map(String::as_str).collect::<Vec<_>>())?;
        info!("Building {}", self.pb_bin);
        let build = self.build_command();
        Host::Local.exec(&build.iter().map(String::as_str).collect::<Vec<_>>())
    }
}
