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

//! journald native protocol output
//! ===============================
//!
//! # Introduction
//!
//! [`JournalFormat`] emits records in the [native journal protocol]: `KEY=value\n` lines, with
//! an alternate frame for values that contain a newline or are outright binary — the `=` is
//! replaced with `\n`, followed by a little-endian 64-bit length, the raw bytes, and a
//! terminating `\n`.
//!
//! [native journal protocol]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
//!
//! # Discussion
//!
//! Groups have no native representation in the journal; they become a dot-joined prefix on every
//! subsequent key (`g1.g2.key=`). The well-known fields (`PRIORITY`, `MESSAGE`, `TIMESTAMP`,
//! `CODE_FILE`, `CODE_LINE`, `CODE_FUNC`) are upper-case as the journal expects; caller-supplied
//! keys are passed through as-is, for cross-compatibility with harnesses that parse this
//! format back.
//!
//! The format itself is portable; the Linux-only socket that carries it lives in
//! [`transport`](crate::transport).

use crate::buffer::{Buffer, StatePool};
use crate::error::{Error, Result};
use crate::formatter::{append_duration_str, Format, FormatState};
use crate::level::Level;
use crate::record::{AnyValue, Source};

use backtrace::Backtrace;
use bytes::BufMut;
use chrono::{DateTime, Utc};

use std::io::Write;
use std::time::Duration;

/// The formatting hooks for journal output.
pub(crate) struct JournalFormat;

/// The state needed to construct a journal-format log record: the live group stack and the
/// dot-joined key prefix derived from it.
#[derive(Default)]
pub(crate) struct JournalState {
    groups: Vec<String>,
    prefix: Vec<u8>,
}

static JOURNAL_STATES: StatePool<JournalState> = StatePool::new();

impl FormatState for JournalState {
    fn reset(&mut self, groups: &[String], _prefmt: Option<&Buffer>) {
        self.groups.clear();
        self.prefix.clear();
        for g in groups {
            self.push_group(g);
        }
    }

    fn pool() -> &'static StatePool<JournalState> {
        &JOURNAL_STATES
    }
}

impl JournalState {
    pub(crate) fn push_group(&mut self, g: &str) {
        self.groups.push(g.to_string());
        if !self.prefix.is_empty() {
            self.prefix.push(b'.');
        }
        self.prefix.extend_from_slice(g.as_bytes());
    }

    pub(crate) fn pop_group(&mut self) {
        self.groups.pop();
        match self.prefix.iter().rposition(|&c| c == b'.') {
            Some(i) => self.prefix.truncate(i),
            None => self.prefix.clear(),
        }
    }

    pub(crate) fn prefix(&self) -> &[u8] {
        &self.prefix
    }
}

impl Format for JournalFormat {
    type State = JournalState;

    fn pprof_key(&self) -> &'static str {
        "GOROUTINE"
    }

    fn baggage_key(&self) -> &'static str {
        "BAGGAGE"
    }

    fn start(&self, _b: &mut Buffer, _s: &mut JournalState) {}

    fn end(&self, _b: &mut Buffer, _s: &mut JournalState) {}

    fn write_level(&self, b: &mut Buffer, _s: &mut JournalState, l: Level) {
        b.extend_from_slice(b"PRIORITY=");
        b.push(level_to_priority(l));
        b.push(b'\n');
    }

    fn write_source(&self, b: &mut Buffer, _s: &mut JournalState, src: &Source) {
        if !src.file.is_empty() {
            b.extend_from_slice(b"CODE_FILE=");
            journal_string(b, &src.file);
        }
        if src.line != 0 {
            b.extend_from_slice(b"CODE_LINE=");
            let _ = write!(&mut **b, "{}", src.line);
            b.push(b'\n');
        }
        if let Some(func) = &src.function {
            b.extend_from_slice(b"CODE_FUNC=");
            journal_string(b, func);
        }
    }

    fn write_message(&self, b: &mut Buffer, _s: &mut JournalState, msg: &str) {
        b.extend_from_slice(b"MESSAGE=");
        journal_string(b, msg);
    }

    fn write_time(&self, b: &mut Buffer, _s: &mut JournalState, t: DateTime<Utc>) {
        // This is almost always unneeded, as the journal will timestamp messages as they're
        // received.
        b.extend_from_slice(b"TIMESTAMP=");
        let _ = write!(&mut **b, "{}", t.timestamp_micros());
        b.push(b'\n');
    }

    fn append_key(&self, b: &mut Buffer, s: &mut JournalState, k: &str) {
        if !s.prefix.is_empty() {
            b.extend_from_slice(&s.prefix);
            b.push(b'.');
        }
        b.extend_from_slice(k.as_bytes());
        b.push(b'=');
    }

    fn append_string(&self, b: &mut Buffer, _s: &mut JournalState, v: &str) {
        journal_string(b, v);
    }

    fn append_bool(&self, b: &mut Buffer, _s: &mut JournalState, v: bool) {
        b.extend_from_slice(if v { b"true" } else { b"false" });
        b.push(b'\n');
    }

    fn append_int64(&self, b: &mut Buffer, _s: &mut JournalState, v: i64) {
        let _ = write!(&mut **b, "{}", v);
        b.push(b'\n');
    }

    fn append_uint64(&self, b: &mut Buffer, _s: &mut JournalState, v: u64) {
        let _ = write!(&mut **b, "{}", v);
        b.push(b'\n');
    }

    fn append_float64(&self, b: &mut Buffer, _s: &mut JournalState, v: f64) {
        let _ = write!(&mut **b, "{}", v);
        b.push(b'\n');
    }

    fn append_time(&self, b: &mut Buffer, _s: &mut JournalState, t: DateTime<Utc>) {
        let _ = write!(&mut **b, "{}", t.timestamp_micros());
        b.push(b'\n');
    }

    fn append_duration(&self, b: &mut Buffer, _s: &mut JournalState, d: Duration) {
        append_duration_str(b, d);
        b.push(b'\n');
    }

    fn append_any(&self, b: &mut Buffer, _s: &mut JournalState, v: &AnyValue) -> Result<()> {
        match v {
            AnyValue::Error(err) => journal_string(b, &err.to_string()),
            AnyValue::Text(m) => {
                let t = m.marshal_text().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                journal_string(b, &t);
            }
            AnyValue::Binary(m) => {
                let o = m.marshal_binary().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                journal_binary(b, &o);
            }
            AnyValue::Bytes(bin) => journal_binary(b, bin),
            AnyValue::Display(v) => journal_string(b, &v.to_string()),
            AnyValue::Debug(v) => journal_string(b, &format!("{:?}", v)),
            AnyValue::Url(u) => journal_string(b, u),
            AnyValue::Json(m) => {
                let o = m.marshal_json().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                journal_binary(b, &o);
            }
            AnyValue::Reflect(j) => {
                // No interface to exploit; length-prefix the display form unconditionally.
                b.replace_tail(b'\n');
                let i = b.len();
                b.put_u64_le(0);
                let _ = write!(&mut **b, "{}", j);
                let n = (b.len() - i - 8) as u64;
                b[i..i + 8].copy_from_slice(&n.to_le_bytes());
                b.push(b'\n');
            }
        }
        Ok(())
    }

    fn push_group(&self, _b: &mut Buffer, s: &mut JournalState, name: &str) {
        s.push_group(name);
    }

    fn pop_group(&self, _b: &mut Buffer, s: &mut JournalState) {
        s.pop_group();
    }
}

/// Emit the correct encoding for a journal value.
///
/// Assumes the tail byte in the buffer is the `=` of the field it belongs to; values containing
/// a newline switch the field to the length-prefixed frame.
pub(crate) fn journal_string(b: &mut Buffer, v: &str) {
    if v.as_bytes().contains(&b'\n') {
        b.replace_tail(b'\n');
        b.put_u64_le(v.len() as u64);
    }
    b.extend_from_slice(v.as_bytes());
    b.push(b'\n');
}

/// Emit a binary value in the length-prefixed frame, unconditionally.
fn journal_binary(b: &mut Buffer, v: &[u8]) {
    b.replace_tail(b'\n');
    b.put_u64_le(v.len() as u64);
    b.extend_from_slice(v);
    b.push(b'\n');
}

/// Map a level to a syslog(3) priority digit.
///
/// Severities past [`Level::EMERGENCY`] saturate at `'0'`.
pub(crate) fn level_to_priority(l: Level) -> u8 {
    match l {
        l if l <= Level::DEBUG => b'7',
        l if l <= Level::INFO => b'6',
        l if l <= Level::NOTICE => b'5',
        l if l <= Level::WARN => b'4',
        l if l <= Level::ERROR => b'3',
        l if l <= Level::CRITICAL => b'2',
        l if l <= Level::ALERT => b'1',
        _ => b'0',
    }
}
