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

//! # Command execution on the local or a remote host

use crate::{Error, Result};

use log::*;
use std::fmt;
use std::process::Command;

/// Credentials of a remote host, reached over ssh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    /// Hostname or address
    pub hostname: String,
    /// Login name
    pub username: String,
    /// Password, passed to `sshpass`
    pub password: String,
}

/// # Host Handle
///
/// Describes where a command is executed. Remote commands are wrapped into
/// `sshpass -p <password> ssh <user>@<host> <command>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    /// The machine running this program
    Local,
    /// A remote machine
    Remote(RemoteHost),
}

impl Host {
    /// Create a handle to a remote host
    pub fn remote(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Host::Remote(RemoteHost {
            hostname: hostname.into(),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Build the argument vector which is actually executed for the given command.
    pub fn command_line(&self, args: &[&str]) -> Vec<String> {
        match self {
            Host::Local => args.iter().map(|a| a.to_string()).collect(),
            Host::Remote(r) => vec![
                "sshpass".to_string(),
                "-p".to_string(),
                r.password.clone(),
                "ssh".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                format!("{}@{}", r.username, r.hostname),
                args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" "),
            ],
        }
    }

    /// Execute a command and return its standard output. A non-zero exit status is turned into
    /// [`Error::CommandFailed`].
    pub fn run(&self, args: &[&str]) -> Result<String> {
        let cmd_str = args.join(" ");
        let argv = self.command_line(args);
        debug!("[{}] {}", self, cmd_str);

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|e| Error::IoError(cmd_str.clone(), e))?;

        let stdout = String::from_utf8(output.stdout)?;
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(Error::CommandFailed {
                cmd: cmd_str,
                status: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }

    /// Execute a command, ignoring its output.
    pub fn exec(&self, args: &[&str]) -> Result<()> {
        self.run(args).map(|_| ())
    }

    /// Check that a program is available on the host.
    pub fn check_installed(&self, tool: &str) -> Result<()> {
        match self.run(&["which", tool]) {
            Ok(path) if !path.trim().is_empty() => Ok(()),
            _ => Err(Error::NotInstalled { tool: tool.to_string(), host: self.to_string() }),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Local => write!(f, "localhost"),
            Host::Remote(r) => write!(f, "{}", r.hostname),
        }
    }
}

/// Quote an argument for the remote shell, if necessary.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn local_command_line() {
        let args = ["ip", "link", "set", "dev", "TAP0", "up"];
        assert_eq!(Host::Local.command_line(&args), args.to_vec());
    }

    #[test]
    fn remote_command_line() {
        let host = Host::remote("10.233.0.2", "root", "pw");
        let line = host.command_line(&["ovs-p4ctl", "add-entry", "br0", "t", "a=1,action=x(2)"]);
        assert_eq!(line[0], "sshpass");
        assert_eq!(line[2], "pw");
        assert_eq!(line[6], "root@10.233.0.2");
        assert_eq!(line[7], "ovs-p4ctl add-entry br0 t 'a=1,action=x(2)'");
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("TAP0"), "TAP0");
        assert_eq!(shell_quote("10.0.0.1/24"), "10.0.0.1/24");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn display() {
        assert_eq!(Host::Local.to_string(), "localhost");
        assert_eq!(Host::remote("client", "u", "p").to_string(), "client");
    }
}
