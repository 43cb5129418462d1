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

//! # P4-OVS Host Utilities
//!
//! This is a very simple crate to drive the tools of a P4-OVS host: `ovs-vsctl`, `ovs-p4ctl`,
//! `gnmi-cli`, `iproute2`, `ethtool` and `netperf`. Every operation can be executed either on the
//! local host, or on a remote host over ssh.
//!
//! ```no_run
//! use p4ovs::{iproute, ovs, Host};
//!
//! fn main() -> Result<(), p4ovs::Error> {
//!     let remote = Host::remote("10.0.0.2", "root", "password");
//!
//!     // create a bridge on both hosts
//!     ovs::add_bridge(&Host::Local, "br-int")?;
//!     ovs::add_bridge(&remote, "br-int")?;
//!
//!     // bring them up
//!     iproute::set_dev_up(&Host::Local, "br-int")?;
//!     iproute::set_dev_up(&remote, "br-int")?;
//!
//!     ovs::del_bridge(&remote, "br-int")?;
//!     ovs::del_bridge(&Host::Local, "br-int")?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

pub mod gnmi;
mod host;
pub mod iproute;
pub mod netns;
pub mod netperf;
pub mod ovs;
pub mod p4ctl;
mod types;
pub use host::{Host, RemoteHost};
pub use types::*;

use thiserror::Error;

/// # P4-OVS Error type
#[derive(Debug, Error)]
pub enum Error {
    /// The command could not be spawned
    #[error("IO Error while running `{0}`: {1}")]
    IoError(String, #[source] std::io::Error),
    /// The command exited with a non-zero status
    #[error("Command `{cmd}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that was executed
        cmd: String,
        /// Exit status, or `-1` if the process was killed by a signal
        status: i32,
        /// Captured standard error
        stderr: String,
    },
    /// The command succeeded, but its output does not look like expected
    #[error("Unexpected output of `{cmd}`: {reason}")]
    UnexpectedOutput {
        /// The command line that was executed
        cmd: String,
        /// What was wrong with the output
        reason: String,
    },
    /// The output of a command is not valid UTF-8
    #[error("Command output is not valid UTF-8: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
    /// A required tool is not installed
    #[error("{tool} is not installed on {host}")]
    NotInstalled {
        /// Name of the tool
        tool: String,
        /// Host on which the tool is missing
        host: String,
    },
}

/// P4-OVS Result type
pub type Result<T> = core::result::Result<T, Error>;
