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

//! Bounded retry of a fallible operation

use log::*;
use std::fmt::Display;

/// Number of attempts for every netperf client run
pub const NETPERF_ATTEMPTS: usize = 3;

/// All attempts of [`retry`] failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Number of attempts made
    pub attempts: usize,
    /// Error of the last attempt
    pub last_error: E,
}

/// Call `op` until it succeeds, but at most `max_attempts` times. Retries happen immediately. On
/// success, the value is returned together with the number of attempts it took.
///
/// ```
/// # use lnt_runtime::retry::retry;
/// let mut calls = 0;
/// let result = retry(3, || {
///     calls += 1;
///     if calls < 2 { Err("refused") } else { Ok(calls) }
/// });
/// assert_eq!(result, Ok((2, 2)));
/// ```
pub fn retry<T, E: Display>(
    max_attempts: usize,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<(T, usize), Exhausted<E>> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if attempt >= max_attempts => {
                return Err(Exhausted { attempts: attempt, last_error: e })
            }
            Err(e) => {
                warn!("Attempt {} of {} failed: {}. Trying one more time", attempt, max_attempts, e);
                attempt += 1;
            }
        }
    }
}
