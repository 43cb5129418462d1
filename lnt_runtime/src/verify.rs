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

//! # Load-Balance Verifier
//!
//! Checks that the packets sent by a VM during a single netperf run are accounted for on the
//! ECMP links. The sender's TX packet counter and the `out-unicast-pkts` counter of every monitored
//! link are read before and after the run. The check passes if
//!
//! ```text
//! sum(link deltas) + delta >= sender TX delta
//! ```
//!
//! where `delta` is the configured tolerance.

use crate::testbed::{Testbed, VmSession};
use crate::traffic::netperf_with_retry;
use crate::{check, EcmpTest, Error, Phase};

use p4ovs::{signed_delta, CounterSet, InterfaceCounters};

use log::*;
use serde::Serialize;

use std::convert::TryFrom;

const PHASE: Phase = Phase::Verification;

/// Counter read on every monitored link
pub const COUNTER_TYPE: &str = "out-unicast-pkts";

/// Counter read on the interface of the sending VM
pub const TX_PACKETS: &str = "packets";

/// Result of the load-balancing check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalanceReport {
    /// Packets transmitted by the sender
    pub vm_packet: i64,
    /// Sum of the packets forwarded over all monitored links
    pub stat_total: i64,
    /// Tolerance
    pub delta: u64,
    /// Packets forwarded over each monitored link
    pub link_deltas: Vec<i64>,
    /// Whether `stat_total + delta >= vm_packet`
    pub passed: bool,
}

impl LoadBalanceReport {
    /// Indices of the links whose counter decreased
    pub fn negative_links(&self) -> Vec<usize> {
        self.link_deltas.iter().enumerate().filter(|(_, d)| **d < 0).map(|(i, _)| i).collect()
    }
}

/// Counter snapshots that cannot be compared
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The TX packet counter of the sender is missing
    #[error("The sender reports no TX {0} counter")]
    MissingTx(&'static str),
    /// A monitored link lacks the counter
    #[error("Link {link} reports no {counter} counter")]
    MissingCounter {
        /// Index of the link in the monitored list
        link: usize,
        /// Name of the counter
        counter: &'static str,
    },
    /// The number of snapshots before and after differ
    #[error("{before} links sampled before, but {after} after the run")]
    LinkCountMismatch {
        /// Snapshots taken before the run
        before: usize,
        /// Snapshots taken after the run
        after: usize,
    },
}

fn tx_packets(counters: &InterfaceCounters) -> Result<u64, VerifyError> {
    counters.tx.get(TX_PACKETS).ok_or(VerifyError::MissingTx(TX_PACKETS))
}

/// Compare the counter snapshots of the sender and the monitored links.
pub fn evaluate(
    sender_before: &InterfaceCounters,
    sender_after: &InterfaceCounters,
    links_before: &[CounterSet],
    links_after: &[CounterSet],
    delta: u64,
) -> Result<LoadBalanceReport, VerifyError> {
    if links_before.len() != links_after.len() {
        return Err(VerifyError::LinkCountMismatch {
            before: links_before.len(),
            after: links_after.len(),
        });
    }
    let vm_packet = signed_delta(tx_packets(sender_after)?, tx_packets(sender_before)?);
    let link_deltas = links_before
        .iter()
        .zip(links_after.iter())
        .enumerate()
        .map(|(link, (before, after))| {
            after
                .delta(before)
                .get(COUNTER_TYPE)
                .copied()
                .ok_or(VerifyError::MissingCounter { link, counter: COUNTER_TYPE })
        })
        .collect::<Result<Vec<i64>, VerifyError>>()?;
    let stat_total = link_deltas.iter().fold(0i64, |total, d| total.saturating_add(*d));
    Ok(LoadBalanceReport {
        vm_packet,
        stat_total,
        delta,
        passed: stat_total.saturating_add(i64::try_from(delta).unwrap_or(i64::MAX)) >= vm_packet,
        link_deltas,
    })
}

impl<T: Testbed> EcmpTest<T> {
    /// Read all counters of the monitored links. A failed read is recorded, and returned as
    /// `None`.
    fn link_counters(&mut self) -> Option<Vec<CounterSet>> {
        let links = self.config.gnmi_phy_with_ctrl_port();
        let mut result = Some(Vec::new());
        for id in self.config.traffic.send_port.iter() {
            let link = match links.get(*id) {
                Some(link) => link,
                None => {
                    self.outcome.record(PHASE, format!("No port with a control port at {}", id));
                    result = None;
                    continue;
                }
            };
            match self.testbed.port_counters(link) {
                Ok(counters) => {
                    if let Some(r) = result.as_mut() {
                        r.push(counters)
                    }
                }
                Err(e) => {
                    self.outcome
                        .record(PHASE, format!("unable to get counter of {}: {}", link.name, e));
                    result = None;
                }
            }
        }
        result
    }

    /// Run a single netperf test from the sending VM, and check that its packets were forwarded
    /// over the ECMP links. A failed comparison is recorded, but does not abort the run.
    pub(crate) fn verify_load_balance(&mut self, sessions: &mut [T::Session]) -> Result<(), Error> {
        info!("Send netperf traffic to verify load balancing");
        let sender = self.config.traffic.vm;
        let session = match sessions.get_mut(sender) {
            Some(s) => s,
            None => {
                self.outcome.record(PHASE, format!("No session to the sending VM{}", sender));
                return Ok(());
            }
        };
        let name = session.name().to_string();
        let iface = self.config.port[sender].interface.clone().unwrap_or_default();
        let target = self.config.load_balance_target().unwrap_or_default();
        let run = self.config.netperf_run(&target, &self.config.netperf.testname[0]);

        info!("Record port {} counter before sending traffic on {}", iface, name);
        let sender_before = check(
            &mut self.outcome,
            PHASE,
            format!("unable to get counter of {} on {}", iface, name),
            session.interface_counters(&iface),
        )?;
        let links_before = self.link_counters();

        netperf_with_retry(&mut self.outcome, &mut self.netperf_runs, &name, &run, || {
            session.netperf(&run)
        })?;

        let sender_after = check(
            &mut self.outcome,
            PHASE,
            format!("unable to get counter of {} on {}", iface, name),
            session.interface_counters(&iface),
        )?;
        let links_after = self.link_counters();

        let (links_before, links_after) = match (links_before, links_after) {
            (Some(before), Some(after)) => (before, after),
            _ => {
                warn!("Skipping the load-balancing comparison, not all link counters are known");
                return Ok(());
            }
        };

        let report = match evaluate(
            &sender_before,
            &sender_after,
            &links_before,
            &links_after,
            self.config.netperf.delta,
        ) {
            Ok(report) => report,
            Err(e) => {
                self.outcome.record(PHASE, format!("Cannot compare the counters: {}", e));
                return Ok(());
            }
        };

        for link in report.negative_links() {
            let port = self.config.traffic.send_port[link];
            self.outcome.record(
                PHASE,
                format!("Packets are not forwarded on one of the ecmp links (port {})", port),
            );
        }
        if report.passed {
            info!(
                "PASS: Minimum {} packets expected and {} received",
                report.vm_packet, report.stat_total
            );
        } else {
            self.outcome.record(
                PHASE,
                format!("{} packets expected but {} received", report.vm_packet, report.stat_total),
            );
        }
        self.load_balance = Some(report);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn tx(packets: u64) -> InterfaceCounters {
        InterfaceCounters {
            rx: CounterSet::new(),
            tx: CounterSet(btreemap! {
                "bytes".to_string() => packets.saturating_mul(1500),
                "packets".to_string() => packets,
            }),
        }
    }

    fn links(values: &[u64]) -> Vec<CounterSet> {
        values
            .iter()
            .map(|v| {
                CounterSet(btreemap! {
                    COUNTER_TYPE.to_string() => *v,
                    "in-unicast-pkts".to_string() => 7,
                })
            })
            .collect()
    }

    #[test]
    fn balanced_traffic_passes() {
        let r = evaluate(&tx(80), &tx(160), &links(&[100, 100]), &links(&[140, 145]), 5).unwrap();
        assert_eq!(r.vm_packet, 80);
        assert_eq!(r.stat_total, 85);
        assert_eq!(r.link_deltas, vec![40, 45]);
        assert!(r.passed);
        assert!(r.negative_links().is_empty());
    }

    #[test]
    fn single_link_fails() {
        let r = evaluate(&tx(80), &tx(160), &links(&[100, 100]), &links(&[105, 100]), 5).unwrap();
        assert_eq!(r.stat_total, 5);
        assert!(!r.passed);
    }

    #[test]
    fn tolerance_is_inclusive() {
        let r = evaluate(&tx(0), &tx(50), &links(&[0, 0]), &links(&[20, 25]), 5).unwrap();
        assert!(r.passed);
        let r = evaluate(&tx(0), &tx(51), &links(&[0, 0]), &links(&[20, 25]), 5).unwrap();
        assert!(!r.passed);
    }

    #[test]
    fn negative_delta_is_summed() {
        let r = evaluate(&tx(0), &tx(10), &links(&[50, 0]), &links(&[40, 30]), 0).unwrap();
        assert_eq!(r.link_deltas, vec![-10, 30]);
        assert_eq!(r.stat_total, 20);
        assert_eq!(r.negative_links(), vec![0]);
        assert!(r.passed);
    }

    #[test]
    fn missing_counters() {
        assert_eq!(
            evaluate(&InterfaceCounters::default(), &tx(10), &links(&[0]), &links(&[1]), 0),
            Err(VerifyError::MissingTx(TX_PACKETS))
        );
        let empty = vec![CounterSet::new()];
        assert_eq!(
            evaluate(&tx(0), &tx(10), &links(&[0]), &empty, 0),
            Err(VerifyError::MissingCounter { link: 0, counter: COUNTER_TYPE })
        );
        assert_eq!(
            evaluate(&tx(0), &tx(10), &links(&[0, 0]), &links(&[1]), 0),
            Err(VerifyError::LinkCountMismatch { before: 2, after: 1 })
        );
    }

    #[test]
    fn counters_near_the_limit() {
        // a huge tolerance does not wrap around
        let r = evaluate(&tx(0), &tx(80), &links(&[0, 0]), &links(&[0, 0]), u64::MAX).unwrap();
        assert_eq!(r.stat_total, 0);
        assert!(r.passed);

        // counters close to u64::MAX
        let top = u64::MAX - 100;
        let after = links(&[top + 40, top + 45]);
        let r = evaluate(&tx(top), &tx(top + 80), &links(&[top, top]), &after, 5).unwrap();
        assert_eq!(r.vm_packet, 80);
        assert_eq!(r.link_deltas, vec![40, 45]);
        assert!(r.passed);

        // per-link deltas that do not fit into i64 saturate
        let after = links(&[u64::MAX, u64::MAX]);
        let r = evaluate(&tx(0), &tx(10), &links(&[0, 0]), &after, 0).unwrap();
        assert_eq!(r.link_deltas, vec![i64::MAX, i64::MAX]);
        assert_eq!(r.stat_total, i64::MAX);
        assert!(r.passed);
    }
}
