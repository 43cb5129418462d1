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

//! # Netperf client command and result check

use crate::{Error, Host, Result};

use regex::Regex;

/// A single netperf client invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetperfRun {
    /// Address of the netserver
    pub target: String,
    /// Test length in seconds
    pub duration: u32,
    /// Test name (e.g., `TCP_STREAM`)
    pub test: String,
    /// Additional command line options, passed verbatim
    pub option: String,
}

impl NetperfRun {
    /// Arguments of the client command
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "netperf".to_string(),
            "-H".to_string(),
            self.target.clone(),
            "-l".to_string(),
            self.duration.to_string(),
            "-t".to_string(),
            self.test.clone(),
        ];
        args.extend(self.option.split_whitespace().map(String::from));
        args
    }

    /// The client command as a single line
    pub fn command(&self) -> String {
        self.args().join(" ")
    }
}

/// Returns true if the netperf output contains a result row, and no error.
///
/// A result row is a line of at least five numeric columns, like
/// `131072  16384  16384    10.00    9386.77`.
pub fn is_success(output: &str) -> bool {
    let row_re = Regex::new(r"(?m)^\s*(\d+(\.\d+)?\s+){4,}\d+(\.\d+)?\s*$").unwrap();
    let failed = output.contains("netperf:") || output.contains("establish control");
    !failed && row_re.is_match(output)
}

/// Turn the output of a netperf run into a result.
pub fn check_output(run: &NetperfRun, output: &str) -> Result<()> {
    if is_success(output) {
        Ok(())
    } else {
        Err(Error::UnexpectedOutput {
            cmd: run.command(),
            reason: output.lines().last().unwrap_or("no output").trim().to_string(),
        })
    }
}

/// Check that netperf and netserver are installed on the host
pub fn check_installed(host: &Host) -> Result<()> {
    host.check_installed("netperf")?;
    host.check_installed("netserver")
}
