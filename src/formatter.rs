// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of zlog.
//
// zlog is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! Record formatting primitives
//! ============================
//!
//! # Introduction
//!
//! This module defines the [`Format`] trait that every output format implements, and the
//! [`FormatState`] trait for the per-record scratch state each format mutates while a record is
//! assembled.
//!
//! # Discussion
//!
//! An encoder like this is classically built as a table of function pointers, one table per
//! format, so that every record shares the same indirect-call pattern. In Rust the natural
//! spelling is a trait whose methods mirror the table, with the handler generic over the
//! implementation; monomorphization recovers the codegen density the table was after, and the
//! associated `State` type statically ties each format to its scratch-state shape.

use crate::buffer::{Buffer, StatePool};
use crate::error::Result;
use crate::level::Level;
use crate::record::{AnyValue, Source};

use chrono::{DateTime, Utc};

use std::time::Duration;

/// Operations every output format must support.
///
/// The `write_*` hooks are only ever called with values generated by the handler itself; the
/// `append_*` hooks carry caller data and do their own escaping.
pub(crate) trait Format {
    type State: FormatState + 'static;

    /// The group name under which profiler labels are nested.
    fn pprof_key(&self) -> &'static str;
    /// The group name under which baggage members are nested.
    fn baggage_key(&self) -> &'static str;

    // Lifecycle hooks:
    fn start(&self, b: &mut Buffer, s: &mut Self::State);
    fn end(&self, b: &mut Buffer, s: &mut Self::State);

    // Handler-generated values:
    fn write_level(&self, b: &mut Buffer, s: &mut Self::State, l: Level);
    fn write_source(&self, b: &mut Buffer, s: &mut Self::State, src: &Source);
    fn write_time(&self, b: &mut Buffer, s: &mut Self::State, t: DateTime<Utc>);
    fn write_message(&self, b: &mut Buffer, s: &mut Self::State, msg: &str);

    // Caller data:
    fn append_key(&self, b: &mut Buffer, s: &mut Self::State, k: &str);
    fn append_string(&self, b: &mut Buffer, s: &mut Self::State, v: &str);
    fn append_bool(&self, b: &mut Buffer, s: &mut Self::State, v: bool);
    fn append_int64(&self, b: &mut Buffer, s: &mut Self::State, v: i64);
    fn append_uint64(&self, b: &mut Buffer, s: &mut Self::State, v: u64);
    fn append_float64(&self, b: &mut Buffer, s: &mut Self::State, v: f64);
    fn append_time(&self, b: &mut Buffer, s: &mut Self::State, t: DateTime<Utc>);
    fn append_duration(&self, b: &mut Buffer, s: &mut Self::State, d: Duration);
    /// Fails when the value's marshaler fails.
    fn append_any(&self, b: &mut Buffer, s: &mut Self::State, v: &AnyValue) -> Result<()>;

    // Grouping hooks:
    fn push_group(&self, b: &mut Buffer, s: &mut Self::State, name: &str);
    fn pop_group(&self, b: &mut Buffer, s: &mut Self::State);
}

/// Per-record state used to keep track of formatting.
pub(crate) trait FormatState: Default + Send {
    /// Re-seed this state for a record emitted by a handler with the given group stack &
    /// pre-formatted buffer.
    fn reset(&mut self, groups: &[String], prefmt: Option<&Buffer>);

    /// Called by the handler immediately after splicing the pre-formatted attribute bytes into
    /// the record buffer; `trailing_opens` is the number of group-opens dangling at the tail of
    /// those bytes.
    fn splice_preformatted(&mut self, trailing_opens: usize) {
        let _ = trailing_opens;
    }

    /// The process-wide pool for this state type.
    fn pool() -> &'static StatePool<Self>
    where
        Self: Sized;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     duration rendering                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Append the human-readable rendition of `d`: "1.2s", "350ms", "1.5µs", "1h2m3s", "0s".
///
/// Sub-second durations pick the largest unit that keeps the integer part non-zero; second and
/// larger durations spell hours, minutes & fractional seconds. Trailing zeros in the fraction
/// are dropped.
pub(crate) fn append_duration_str(b: &mut Vec<u8>, d: Duration) {
    let ns = d.as_nanos();
    if ns == 0 {
        b.extend_from_slice(b"0s");
        return;
    }
    if ns < 1_000 {
        b.extend_from_slice(ns.to_string().as_bytes());
        b.extend_from_slice(b"ns");
    } else if ns < 1_000_000 {
        push_scaled(b, ns, 1_000, "\u{b5}s");
    } else if ns < 1_000_000_000 {
        push_scaled(b, ns, 1_000_000, "ms");
    } else {
        let total_secs = ns / 1_000_000_000;
        let frac = ns % 1_000_000_000;
        let hours = total_secs / 3600;
        let mins = total_secs / 60 % 60;
        let secs = total_secs % 60;
        if hours != 0 {
            b.extend_from_slice(hours.to_string().as_bytes());
            b.push(b'h');
        }
        if hours != 0 || mins != 0 {
            b.extend_from_slice(mins.to_string().as_bytes());
            b.push(b'm');
        }
        b.extend_from_slice(secs.to_string().as_bytes());
        push_frac(b, frac, 9);
        b.push(b's');
    }
}

/// Append `ns` scaled down by `unit`, with up to `unit.ilog10()` fractional digits.
fn push_scaled(b: &mut Vec<u8>, ns: u128, unit: u128, suffix: &str) {
    b.extend_from_slice((ns / unit).to_string().as_bytes());
    push_frac(b, ns % unit, unit.ilog10());
    b.extend_from_slice(suffix.as_bytes());
}

/// Append a decimal point & `frac` zero-padded to `digits`, with trailing zeros (and a
/// fraction of zero entirely) dropped.
fn push_frac(b: &mut Vec<u8>, frac: u128, digits: u32) {
    if frac == 0 {
        return;
    }
    let mut s = format!("{:0width$}", frac, width = digits as usize);
    while s.ends_with('0') {
        s.pop();
    }
    b.push(b'.');
    b.extend_from_slice(s.as_bytes());
}
