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

//! Utilities for telnet interactions with the serial console of a local VM

use crate::testbed::VmSession;

use p4ovs::netperf::{self, NetperfRun};
use p4ovs::{Error, InterfaceCounters, Result};

use log::*;
use regex::Regex;
use telnet::{Telnet, TelnetEvent};

use std::thread::sleep;
use std::time::{Duration, SystemTime};

/// Time to wait for the login prompt after connecting (the VM may still be booting).
const BOOT_WAIT_S: u64 = 300;

/// Telnet console port of the first VM. VM `i` listens on `VM_CONSOLE_PORT_BASE + i`.
pub const VM_CONSOLE_PORT_BASE: u16 = 6550;

/// Prefix of the marker appended to every command to retrieve its exit status. The marker of a
/// command is `LNT_RC_<seq>=`, with `seq` counting the commands sent on the session.
const STATUS_MARKER: &str = "LNT_RC_";

/// # Connection to a VM console
///
/// The VM exposes its serial console over telnet. After logging in, every command is sent
/// together with an `echo` of its exit status, such that failures can be detected. The marker of
/// the echo is unique per command. Output that belongs to an earlier command (for instance one
/// that timed out) is never taken as the answer of a later one.
///
/// All commands are synchronous and blocking, implemented with a busy loop that sleeps in
/// between reads. The connection is closed when the struct is dropped, or explicitly using
/// [`VmSession::close`].
pub struct VmConnection {
    c: Telnet,
    name: String,
    prompt_re: Regex,
    seq: u64,
    timeout: Duration,
}

impl std::fmt::Debug for VmConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VmConnection({})", self.name)
    }
}

impl VmConnection {
    /// Connect to the console and log in. `timeout` applies to every single command.
    pub fn new(
        name: impl Into<String>,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let prompt_re = Regex::new(r"(?m)[a-zA-Z0-9_\-.@:~/\[\] ]*[#$] \z").unwrap();
        let login_re = Regex::new(r"(?m)login: \z").unwrap();
        let password_re = Regex::new(r"(?m)[Pp]assword: \z").unwrap();

        let addr = format!("{}:{}", host, port);
        let mut c =
            Telnet::connect((host, port), 2048).map_err(|e| Error::IoError(addr.clone(), e))?;
        // receive all initial events
        while let Ok(event) = c.read_timeout(Duration::from_millis(1)) {
            if matches!(event, TelnetEvent::TimedOut) {
                break;
            }
        }

        c.write(b"\n").map_err(|e| Error::IoError(addr.clone(), e))?;

        let now = SystemTime::now();
        let mut result = String::new();
        loop {
            let event = c.read_nonblocking().map_err(|e| Error::IoError(addr.clone(), e))?;
            match event {
                TelnetEvent::NoData => {
                    if now.elapsed().unwrap_or_default() > Duration::from_secs(BOOT_WAIT_S) {
                        error!("{} did not show a login prompt! Port: {}", name, port);
                        return Err(Error::UnexpectedOutput {
                            cmd: format!("telnet {}", addr),
                            reason: "no login prompt".to_string(),
                        });
                    }
                    sleep(Duration::from_millis(10));
                }
                TelnetEvent::Data(d) => result.push_str(&String::from_utf8_lossy(&d)),
                _ => {}
            }
            if login_re.is_match(&result) {
                debug!("{}: sending username", name);
                result.clear();
                c.write(format!("{}\n", username).as_bytes())
                    .map_err(|e| Error::IoError(addr.clone(), e))?;
            } else if password_re.is_match(&result) {
                debug!("{}: sending password", name);
                result.clear();
                c.write(format!("{}\n", password).as_bytes())
                    .map_err(|e| Error::IoError(addr.clone(), e))?;
            } else if prompt_re.is_match(&result) {
                break;
            }
        }

        info!("Logged in to {} on port {}", name, port);
        Ok(Self { c, name, prompt_re, seq: 0, timeout })
    }

    /// Execute a command and return its output. A non-zero exit status results in an error.
    pub fn execute(&mut self, cmd: impl AsRef<str>) -> Result<String> {
        let cmd = cmd.as_ref();
        debug!("[{}] {}", self.name, cmd);
        self.seq += 1;
        let marker = format!("{}{}=", STATUS_MARKER, self.seq);
        let status_re = Regex::new(&format!(r"(?m)^{}(\d+)\r?$", marker)).unwrap();

        self.drain(cmd)?;
        let raw = self.send_wait(format!("{}; echo \"{}$?\"\n", cmd, marker), cmd, &status_re)?;
        let (output, status) = split_output(&raw, &marker, &status_re);
        match status {
            Some(0) => Ok(output),
            Some(status) => Err(Error::CommandFailed {
                cmd: cmd.to_string(),
                status,
                stderr: output.lines().last().unwrap_or_default().to_string(),
            }),
            None => Err(Error::UnexpectedOutput {
                cmd: cmd.to_string(),
                reason: "exit status is missing".to_string(),
            }),
        }
    }

    /// Discard everything the console sent since the last answer.
    fn drain(&mut self, cmd: &str) -> Result<()> {
        let mut stale = String::new();
        loop {
            match self.c.read_nonblocking().map_err(|e| Error::IoError(cmd.to_string(), e))? {
                TelnetEvent::NoData => break,
                TelnetEvent::Data(d) => stale.push_str(&String::from_utf8_lossy(&d)),
                _ => {}
            }
        }
        if !stale.is_empty() {
            debug!("[{}] discarding stale output: {}", self.name, stale.trim_end());
        }
        Ok(())
    }

    fn send_wait(
        &mut self,
        data: impl AsRef<str>,
        cmd: &str,
        status_re: &Regex,
    ) -> Result<String> {
        self.c.write(data.as_ref().as_bytes()).map_err(|e| Error::IoError(cmd.to_string(), e))?;
        self.receive_until_prompt(cmd, status_re)
    }

    fn receive_until_prompt(&mut self, cmd: &str, status_re: &Regex) -> Result<String> {
        let mut result = String::new();
        let now = SystemTime::now();
        loop {
            let event = self.c.read_nonblocking().map_err(|e| Error::IoError(cmd.to_string(), e))?;
            match event {
                TelnetEvent::NoData => {
                    if now.elapsed().unwrap_or_default() > self.timeout {
                        warn!("[{}] {}", self.name, result);
                        return Err(Error::UnexpectedOutput {
                            cmd: cmd.to_string(),
                            reason: format!("no answer within {} seconds", self.timeout.as_secs()),
                        });
                    }
                    sleep(Duration::from_millis(10));
                }
                TelnetEvent::Data(d) => {
                    result.push_str(&String::from_utf8_lossy(&d));
                    if status_re.is_match(&result) && self.prompt_re.is_match(&result) {
                        trace!("[{}] {}", self.name, result);
                        return Ok(result.replace("\r\n", "\n"));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Split the raw console output into the command output and its exit status. The output starts
/// after the echo of the command line (anything before it is stale), and ends at the status line.
fn split_output(raw: &str, marker: &str, status_re: &Regex) -> (String, Option<i32>) {
    let status = status_re.captures_iter(raw).last().and_then(|caps| caps[1].parse().ok());
    let echo = format!("{}$?", marker);
    let lines = raw.lines().collect::<Vec<_>>();
    let start = lines.iter().rposition(|l| l.contains(&echo)).map(|i| i + 1).unwrap_or(0);
    let output = lines[start..]
        .iter()
        .take_while(|l| !status_re.is_match(l))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    (output, status)
}

impl VmSession for VmConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, commands: &[String]) -> Result<()> {
        for cmd in commands {
            self.execute(cmd)?;
        }
        Ok(())
    }

    fn ethtool_offload(&mut self, iface: &str) -> Result<()> {
        self.execute(format!("ethtool --offload {} rx off tx off", iface)).map(|_| ())
    }

    fn change_mtu(&mut self, iface: &str, mtu: u32) -> Result<()> {
        self.execute(format!("ip link set dev {} mtu {}", iface, mtu)).map(|_| ())
    }

    fn check_netperf(&mut self) -> Result<()> {
        for tool in ["netperf", "netserver"].iter() {
            if self.execute(format!("which {}", tool)).is_err() {
                return Err(Error::NotInstalled { tool: tool.to_string(), host: self.name.clone() });
            }
        }
        Ok(())
    }

    fn start_netserver(&mut self) -> Result<()> {
        self.execute("netserver").map(|_| ())
    }

    fn netperf(&mut self, run: &NetperfRun) -> Result<()> {
        let output = self.execute(run.command())?;
        netperf::check_output(run, &output)
    }

    fn interface_counters(&mut self, iface: &str) -> Result<InterfaceCounters> {
        let cmd = format!("ip -s link show dev {}", iface);
        let output = self.execute(&cmd)?;
        InterfaceCounters::parse(&output).ok_or_else(|| Error::UnexpectedOutput {
            cmd,
            reason: "no RX/TX statistics".to_string(),
        })
    }

    fn close(mut self) -> Result<()> {
        info!("Closing the session to {}", self.name);
        self.c.write(b"exit\n").map_err(|e| Error::IoError("exit".to_string(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    const PROMPT: &str = "root@vm0:~# ";

    fn status_re(marker: &str) -> Regex {
        Regex::new(&format!(r"(?m)^{}(\d+)\r?$", marker)).unwrap()
    }

    /// Serve a single console connection on a local port, running `script` on it. Afterwards,
    /// the console stays open until the client hangs up.
    fn console<F>(script: F) -> (u16, JoinHandle<()>)
    where
        F: FnOnce(&mut BufReader<TcpStream>, &mut TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            script(&mut reader, &mut writer);
            let mut rest = String::new();
            while reader.read_line(&mut rest).map(|n| n > 0).unwrap_or(false) {
                rest.clear();
            }
        });
        (port, handle)
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    /// What a shell with echo sends back for `cmd_line`: the echo, the output, the status line
    /// carrying the marker of the command, and a fresh prompt.
    fn answer(cmd_line: &str, output: &str, status: i32) -> String {
        let start = cmd_line.find(STATUS_MARKER).unwrap();
        let end = start + cmd_line[start..].find('=').unwrap();
        let marker = &cmd_line[start..=end];
        let mut reply = format!("{}\r\n", cmd_line);
        if !output.is_empty() {
            reply.push_str(&format!("{}\r\n", output));
        }
        reply.push_str(&format!("{}{}\r\n{}", marker, status, PROMPT));
        reply
    }

    /// The console shows a prompt right away.
    fn logged_in(reader: &mut BufReader<TcpStream>, writer: &mut TcpStream) {
        read_line(reader);
        writer.write_all(PROMPT.as_bytes()).unwrap();
    }

    fn connect(port: u16, timeout: Duration) -> VmConnection {
        VmConnection::new("VM0", "127.0.0.1", port, "root", "secret", timeout).unwrap()
    }

    #[test]
    fn split_console_output() {
        let re = status_re("LNT_RC_3=");
        let raw = "ip -s link show dev ens3; echo \"LNT_RC_3=$?\"\n2: ens3: <UP>\n    link/ether\nLNT_RC_3=0\nroot@vm0:~# ";
        let (output, status) = split_output(raw, "LNT_RC_3=", &re);
        assert_eq!(status, Some(0));
        assert_eq!(output, "2: ens3: <UP>\n    link/ether");

        let re = status_re("LNT_RC_4=");
        let raw = "which netperf; echo \"LNT_RC_4=$?\"\nLNT_RC_4=1\nroot@vm0:~# ";
        let (output, status) = split_output(raw, "LNT_RC_4=", &re);
        assert_eq!(status, Some(1));
        assert_eq!(output, "");
    }

    #[test]
    fn split_output_without_status() {
        let re = status_re("LNT_RC_1=");
        let (_, status) = split_output("netserver\nroot@vm0:~# ", "LNT_RC_1=", &re);
        assert_eq!(status, None);
    }

    #[test]
    fn split_output_skips_stale_answer() {
        let re = status_re("LNT_RC_2=");
        let raw = "sleep 5; echo \"LNT_RC_1=$?\"\nlate\nLNT_RC_1=1\nroot@vm0:~# \
                   hostname; echo \"LNT_RC_2=$?\"\nvm0\nLNT_RC_2=0\nroot@vm0:~# ";
        let (output, status) = split_output(raw, "LNT_RC_2=", &re);
        assert_eq!(status, Some(0));
        assert_eq!(output, "vm0");
    }

    #[test]
    fn login_with_credentials() {
        let (port, server) = console(|reader, writer| {
            read_line(reader);
            writer.write_all(b"vm0 login: ").unwrap();
            assert_eq!(read_line(reader), "root");
            writer.write_all(b"Password: ").unwrap();
            assert_eq!(read_line(reader), "secret");
            writer.write_all(format!("Last login: today\r\n{}", PROMPT).as_bytes()).unwrap();
            let cmd = read_line(reader);
            assert!(cmd.starts_with("hostname; echo \"LNT_RC_1=$?\""));
            writer.write_all(answer(&cmd, "vm0", 0).as_bytes()).unwrap();
        });

        let mut conn = connect(port, Duration::from_secs(5));
        assert_eq!(conn.execute("hostname").unwrap(), "vm0");
        conn.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn exit_status_of_commands() {
        let (port, server) = console(|reader, writer| {
            logged_in(reader, writer);
            let cmd = read_line(reader);
            writer.write_all(answer(&cmd, "", 0).as_bytes()).unwrap();
            let cmd = read_line(reader);
            assert!(cmd.contains("LNT_RC_2="));
            writer.write_all(answer(&cmd, "netperf: not found", 1).as_bytes()).unwrap();
        });

        let mut conn = connect(port, Duration::from_secs(5));
        assert_eq!(conn.execute("true").unwrap(), "");
        match conn.execute("netperf -V") {
            Err(Error::CommandFailed { cmd, status, stderr }) => {
                assert_eq!(cmd, "netperf -V");
                assert_eq!(status, 1);
                assert_eq!(stderr, "netperf: not found");
            }
            r => panic!("unexpected result: {:?}", r),
        }
        drop(conn);
        server.join().unwrap();
    }

    #[test]
    fn late_answer_is_not_taken_for_next_command() {
        let (port, server) = console(|reader, writer| {
            logged_in(reader, writer);
            let first = read_line(reader);
            thread::sleep(Duration::from_millis(1500));
            writer.write_all(answer(&first, "late", 1).as_bytes()).unwrap();
            let second = read_line(reader);
            writer.write_all(answer(&second, "fresh", 0).as_bytes()).unwrap();
        });

        let mut conn = connect(port, Duration::from_secs(1));
        match conn.execute("sleep 5") {
            Err(Error::UnexpectedOutput { reason, .. }) => {
                assert_eq!(reason, "no answer within 1 seconds")
            }
            r => panic!("unexpected result: {:?}", r),
        }
        // the late answer arrives while waiting for the second command
        assert_eq!(conn.execute("echo fresh").unwrap(), "fresh");
        drop(conn);
        server.join().unwrap();
    }

    #[test]
    fn pending_output_is_discarded() {
        let (port, server) = console(|reader, writer| {
            logged_in(reader, writer);
            let first = read_line(reader);
            thread::sleep(Duration::from_millis(1500));
            writer.write_all(answer(&first, "late", 1).as_bytes()).unwrap();
            let second = read_line(reader);
            writer.write_all(answer(&second, "", 0).as_bytes()).unwrap();
        });

        let mut conn = connect(port, Duration::from_secs(1));
        assert!(conn.execute("sleep 5").is_err());
        // the late answer is already buffered when the second command is sent
        thread::sleep(Duration::from_secs(1));
        assert_eq!(conn.execute("true").unwrap(), "");
        drop(conn);
        server.join().unwrap();
    }
}
