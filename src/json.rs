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

//! Line-delimited JSON output
//! ==========================
//!
//! # Introduction
//!
//! [`JsonFormat`] emits one JSON object per record, newline-terminated. Fields are written
//! comma-terminated as they arrive; the [`end`](crate::formatter::Format::end) hook patches the
//! final comma into a closing brace and closes any groups still open, so no field ever needs to
//! know whether it is last.
//!
//! # Escaping
//!
//! String escaping follows the common JSON encoder behavior rather than the strict minimum:
//! HTML metacharacters are *not* escaped, control bytes below 0x20 get `\u00XX` (with the
//! usual short escapes for TAB, LF & CR), and DEL (0x7F) passes through unescaped. That last
//! is arguably wrong but matches the behavior of the encoders this one must interoperate with.

use crate::buffer::{Buffer, StatePool};
use crate::error::{Error, Result};
use crate::formatter::{append_duration_str, Format, FormatState};
use crate::level::Level;
use crate::record::{AnyValue, Source};

use backtrace::Backtrace;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};

use std::io::Write;
use std::time::Duration;

const LEVEL_KEY: &str = "level";
const SOURCE_KEY: &str = "source";
const TIME_KEY: &str = "time";
const MESSAGE_KEY: &str = "msg";

/// The formatting hooks for JSON output.
pub(crate) struct JsonFormat;

/// The state needed to construct a JSON log record.
#[derive(Default)]
pub(crate) struct JsonState {
    /// Number of currently-open groups (seeded from the handler's group stack).
    groups: usize,
    /// Number of trailing groups opened with nothing appended inside them yet; these are elided
    /// by the `end` hook.
    untouched: usize,
}

static JSON_STATES: StatePool<JsonState> = StatePool::new();

impl FormatState for JsonState {
    fn reset(&mut self, groups: &[String], _prefmt: Option<&Buffer>) {
        self.groups = groups.len();
        self.untouched = 0;
    }

    fn splice_preformatted(&mut self, trailing_opens: usize) {
        self.untouched = trailing_opens;
    }

    fn pool() -> &'static StatePool<JsonState> {
        &JSON_STATES
    }
}

impl Format for JsonFormat {
    type State = JsonState;

    fn pprof_key(&self) -> &'static str {
        "goroutine"
    }

    fn baggage_key(&self) -> &'static str {
        "baggage"
    }

    fn start(&self, b: &mut Buffer, _s: &mut JsonState) {
        b.push(b'{');
    }

    fn end(&self, b: &mut Buffer, s: &mut JsonState) {
        if s.untouched != 0 {
            // Trailing groups with nothing in them: drop their opens. The chain of opens
            // (`"a":{"b":{`) contains no commas, so truncating at the last comma removes
            // exactly the chain.
            let i = b.iter().rposition(|&c| c == b',').unwrap_or(0);
            b.truncate(i);
            s.groups = s.groups.saturating_sub(s.untouched);
            s.untouched = 0;
        }
        if b.tail() == Some(b',') {
            b.replace_tail(b'}');
        } else {
            b.push(b'}');
        }
        for _ in 0..s.groups {
            b.push(b'}');
        }
        b.push(b'\n');
    }

    fn write_level(&self, b: &mut Buffer, _s: &mut JsonState, l: Level) {
        b.push(b'"');
        write_json_string(b, LEVEL_KEY);
        b.extend_from_slice(b"\":\"");
        let _ = write!(&mut **b, "{}", l);
        b.extend_from_slice(b"\",");
    }

    fn write_source(&self, b: &mut Buffer, _s: &mut JsonState, src: &Source) {
        b.push(b'"');
        write_json_string(b, SOURCE_KEY);
        b.extend_from_slice(b"\":\"");
        match &src.function {
            Some(func) => write_json_string(b, func),
            None => {
                write_json_string(b, &src.file);
                b.push(b':');
                let _ = write!(&mut **b, "{}", src.line);
            }
        }
        b.extend_from_slice(b"\",");
    }

    fn write_time(&self, b: &mut Buffer, _s: &mut JsonState, t: DateTime<Utc>) {
        b.push(b'"');
        write_json_string(b, TIME_KEY);
        b.extend_from_slice(b"\":\"");
        b.extend_from_slice(t.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
        b.extend_from_slice(b"\",");
    }

    fn write_message(&self, b: &mut Buffer, _s: &mut JsonState, msg: &str) {
        b.push(b'"');
        write_json_string(b, MESSAGE_KEY);
        b.extend_from_slice(b"\":\"");
        write_json_string(b, msg);
        b.extend_from_slice(b"\",");
    }

    fn append_key(&self, b: &mut Buffer, s: &mut JsonState, k: &str) {
        s.untouched = 0;
        b.push(b'"');
        write_json_string(b, k);
        b.extend_from_slice(b"\":");
    }

    fn append_string(&self, b: &mut Buffer, _s: &mut JsonState, v: &str) {
        b.push(b'"');
        write_json_string(b, v);
        b.extend_from_slice(b"\",");
    }

    fn append_bool(&self, b: &mut Buffer, _s: &mut JsonState, v: bool) {
        b.extend_from_slice(if v { b"true" } else { b"false" });
        b.push(b',');
    }

    fn append_int64(&self, b: &mut Buffer, _s: &mut JsonState, v: i64) {
        let _ = write!(&mut **b, "{}", v);
        b.push(b',');
    }

    fn append_uint64(&self, b: &mut Buffer, _s: &mut JsonState, v: u64) {
        let _ = write!(&mut **b, "{}", v);
        b.push(b',');
    }

    fn append_float64(&self, b: &mut Buffer, _s: &mut JsonState, v: f64) {
        let _ = write!(&mut **b, "{}", v);
        b.push(b',');
    }

    fn append_time(&self, b: &mut Buffer, _s: &mut JsonState, t: DateTime<Utc>) {
        b.push(b'"');
        b.extend_from_slice(t.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
        b.extend_from_slice(b"\",");
    }

    fn append_duration(&self, b: &mut Buffer, _s: &mut JsonState, d: Duration) {
        b.push(b'"');
        append_duration_str(b, d);
        b.extend_from_slice(b"\",");
    }

    fn append_any(&self, b: &mut Buffer, _s: &mut JsonState, v: &AnyValue) -> Result<()> {
        match v {
            AnyValue::Json(m) => {
                let o = m.marshal_json().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                b.extend_from_slice(&o);
                b.push(b',');
            }
            AnyValue::Error(err) => {
                self.append_quoted(b, &err.to_string());
            }
            AnyValue::Text(m) => {
                let t = m.marshal_text().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                self.append_quoted(b, &t);
            }
            AnyValue::Binary(m) => {
                let o = m.marshal_binary().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                self.append_quoted(b, &BASE64.encode(o));
            }
            AnyValue::Bytes(bin) => {
                self.append_quoted(b, &BASE64.encode(bin));
            }
            AnyValue::Display(v) => {
                self.append_quoted(b, &v.to_string());
            }
            AnyValue::Debug(v) => {
                self.append_quoted(b, &format!("{:?}", v));
            }
            AnyValue::Url(u) => {
                self.append_quoted(b, u);
            }
            AnyValue::Reflect(j) => {
                serde_json::to_writer(&mut **b, j).map_err(|err| Error::Marshal {
                    source: Box::new(err),
                    back: Backtrace::new(),
                })?;
                b.push(b',');
            }
        }
        Ok(())
    }

    fn push_group(&self, b: &mut Buffer, s: &mut JsonState, name: &str) {
        s.groups += 1;
        s.untouched += 1;
        b.push(b'"');
        write_json_string(b, name);
        b.extend_from_slice(b"\":{");
    }

    fn pop_group(&self, b: &mut Buffer, s: &mut JsonState) {
        s.groups = s.groups.saturating_sub(1);
        s.untouched = s.untouched.saturating_sub(1);
        if b.tail() == Some(b',') {
            b.replace_tail(b'}');
        } else {
            b.push(b'}');
        }
        b.push(b',');
    }
}

impl JsonFormat {
    /// [`append_string`](Format::append_string) without the `&mut State` plumbing, for use from
    /// `append_any`.
    fn append_quoted(&self, b: &mut Buffer, v: &str) {
        b.push(b'"');
        write_json_string(b, v);
        b.extend_from_slice(b"\",");
    }
}

/// Escape `s` for JSON and append it to `b`, without surrounding quotation marks.
///
/// Contiguous runs of safe bytes are copied in one shot.
pub(crate) fn write_json_string(b: &mut Buffer, s: &str) {
    let bytes = s.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c >= 0x80 || SAFE[c as usize] {
            // Multi-byte sequences are valid UTF-8 by construction and pass through.
            i += 1;
            continue;
        }
        if start < i {
            b.extend_from_slice(&bytes[start..i]);
        }
        b.push(b'\\');
        match c {
            b'\\' | b'"' => b.push(c),
            b'\n' => b.push(b'n'),
            b'\r' => b.push(b'r'),
            b'\t' => b.push(b't'),
            _ => {
                // Bytes < 0x20 other than \t, \n and \r.
                b.extend_from_slice(b"u00");
                b.push(HEX[(c >> 4) as usize]);
                b.push(HEX[(c & 0xf) as usize]);
            }
        }
        i += 1;
        start = i;
    }
    if start < bytes.len() {
        b.extend_from_slice(&bytes[start..]);
    }
}

/// The set of hex characters.
pub(crate) static HEX: &[u8; 16] = b"0123456789abcdef";

/// Whether the ASCII byte at each position can appear in a JSON string without escaping.
///
/// True for everything from 0x20 up — including, deliberately, DEL — except the double quote
/// and the backslash.
static SAFE: [bool; 128] = build_safe();

const fn build_safe() -> [bool; 128] {
    let mut t = [false; 128];
    let mut i = 0x20;
    while i < 128 {
        t[i] = true;
        i += 1;
    }
    t[b'"' as usize] = false;
    t[b'\\' as usize] = false;
    t
}
