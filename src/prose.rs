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

//! Human-oriented "prose" output
//! =============================
//!
//! # Introduction
//!
//! [`ProseFormat`] emits records as
//! `LEVEL␟ [SOURCE␟ ]TIME␟ MESSAGE␝ key=value␟ key=value␟ …␞\n`, where `␟` (U+001F, unit
//! separator), `␝` (U+001D, group separator) and `␞` (U+001E, record separator) are the C0
//! field-separator controls. They render as nothing in most terminals, so the line reads as
//! plain prose, while remaining mechanically splittable.
//!
//! # Styling
//!
//! When attached to a terminal (and `NO_COLOR` is unset), output is decorated with ANSI SGR
//! sequences from a twenty-slot table, loaded from the `ZLOG_COLORS` environment variable with
//! [`DEFAULT_PROSE_COLORS`] as the fallback. URLs additionally get OSC-8 hyperlinks.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::formatter::{append_duration_str, Format};
use crate::journal::JournalState;
use crate::json::HEX;
use crate::level::Level;
use crate::record::{AnyValue, Source};

use backtrace::Backtrace;
use base64::{engine::general_purpose::STANDARD_NO_PAD as BASE64_NO_PAD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};

use std::io::Write;
use std::time::Duration;

/// The colors used when the `ZLOG_COLORS` environment variable isn't set.
pub const DEFAULT_PROSE_COLORS: &str =
    "31:33:32:3:96:93::36::1;32:1;31:1;33:32:95:33:4:34:35:21:91";

// These are indexes into the array containing SGR parameters.
const PRINT_ERROR_LEVEL: usize = 0;
const PRINT_WARN_LEVEL: usize = 1;
const PRINT_INFO_LEVEL: usize = 2;
const PRINT_DEBUG_LEVEL: usize = 3;
const PRINT_SOURCE: usize = 4;
const PRINT_TIMESTAMP: usize = 5;
const PRINT_MESSAGE: usize = 6;
const PRINT_KEY: usize = 7;
const PRINT_STRING: usize = 8;
const PRINT_TRUE: usize = 9;
const PRINT_FALSE: usize = 10;
const PRINT_NUMBER: usize = 11;
const PRINT_TIME: usize = 12;
const PRINT_DURATION: usize = 13;
const PRINT_ERROR_VAL: usize = 14;
const PRINT_TEXT: usize = 15;
const PRINT_GO_STRING: usize = 16;
const PRINT_BINARY: usize = 17;
const PRINT_JSON: usize = 18;
const PRINT_REFLECT: usize = 19;
const PRINTER_SIZE: usize = 20;

/// Decorates output with ANSI escape sequences.
///
/// A disabled printer is a valid value; all methods still print their payload, just without the
/// escapes.
pub(crate) struct AnsiPrinter {
    params: Option<[String; PRINTER_SIZE]>,
}

impl AnsiPrinter {
    /// A printer that never emits escapes.
    pub fn disabled() -> AnsiPrinter {
        AnsiPrinter { params: None }
    }

    /// Load the SGR table from `ZLOG_COLORS`, falling back to [`DEFAULT_PROSE_COLORS`].
    ///
    /// Characters outside `0`..=`;` are scrubbed from the environment value before splitting.
    pub fn from_env() -> AnsiPrinter {
        let v = match std::env::var("ZLOG_COLORS") {
            Ok(z) => z.chars().filter(|r| ('0'..=';').contains(r)).collect(),
            Err(_) => DEFAULT_PROSE_COLORS.to_string(),
        };
        let mut slots: Vec<String> = v.split(':').map(str::to_string).collect();
        slots.resize(PRINTER_SIZE, String::new());
        let params: [String; PRINTER_SIZE] = slots.try_into().expect("sized above");
        AnsiPrinter {
            params: Some(params),
        }
    }

    /// Print escape `i`; reports whether a reset needs to follow the payload.
    fn begin(&self, b: &mut Buffer, i: usize) -> bool {
        match &self.params {
            Some(p) if !p[i].is_empty() => {
                b.extend_from_slice(b"\x1b[");
                b.extend_from_slice(p[i].as_bytes());
                b.push(b'm');
                true
            }
            _ => false,
        }
    }

    fn finish(&self, b: &mut Buffer, styled: bool) {
        if styled {
            b.extend_from_slice(b"\x1b[m");
        }
    }

    /// Print `s` with the formatting for slot `i`.
    fn styled(&self, b: &mut Buffer, i: usize, s: &str) {
        let on = self.begin(b, i);
        b.extend_from_slice(s.as_bytes());
        self.finish(b, on);
    }

    /// Escape & print `s` with the "string" formatting.
    fn string(&self, b: &mut Buffer, s: &str) {
        let on = self.begin(b, PRINT_STRING);
        let _ = write!(&mut **b, "{:?}", s);
        self.finish(b, on);
    }

    /// Print `u` with OSC-8 hyperlink formatting applied.
    fn url(&self, b: &mut Buffer, u: &str) {
        if self.params.is_none() {
            b.extend_from_slice(u.as_bytes());
            return;
        }
        b.extend_from_slice(b"\x1b]8;;");
        b.extend_from_slice(u.as_bytes());
        b.extend_from_slice(b"\x1b\\");
        b.extend_from_slice(u.as_bytes());
        b.extend_from_slice(b"\x1b]8;;\x1b\\");
    }
}

/// The formatting hooks for prose output. Shares its scratch state (group stack & dotted
/// prefix) with the journal format.
pub(crate) struct ProseFormat {
    pub printer: AnsiPrinter,
}

/// Used between output "columns". Renders as " " in a terminal.
fn unit_sep(b: &mut Buffer) {
    b.extend_from_slice(b"\x1f ");
}

/// Used after the mandatory record components. Renders as " " in a terminal.
fn group_sep(b: &mut Buffer) {
    b.extend_from_slice(b"\x1d ");
}

impl Format for ProseFormat {
    type State = JournalState;

    fn pprof_key(&self) -> &'static str {
        "goroutine"
    }

    fn baggage_key(&self) -> &'static str {
        "baggage"
    }

    fn start(&self, _b: &mut Buffer, _s: &mut JournalState) {}

    fn end(&self, b: &mut Buffer, _s: &mut JournalState) {
        // The last field left a trailing separator-space; back over it.
        b.unwrite();
        b.extend_from_slice(b"\x1e\n");
    }

    fn write_level(&self, b: &mut Buffer, _s: &mut JournalState, l: Level) {
        let v = l.to_string();
        let pad = 5usize.saturating_sub(v.len());
        let slot = match l {
            l if l >= Level::ERROR => PRINT_ERROR_LEVEL,
            l if l >= Level::WARN => PRINT_WARN_LEVEL,
            l if l >= Level::INFO => PRINT_INFO_LEVEL,
            _ => PRINT_DEBUG_LEVEL,
        };
        self.printer.styled(b, slot, &v);
        for _ in 0..pad {
            b.push(b' ');
        }
        unit_sep(b);
    }

    fn write_source(&self, b: &mut Buffer, _s: &mut JournalState, src: &Source) {
        let on = self.printer.begin(b, PRINT_SOURCE);
        match &src.function {
            Some(func) => b.extend_from_slice(func.as_bytes()),
            None => {
                b.extend_from_slice(src.file.as_bytes());
                b.push(b':');
                let _ = write!(&mut **b, "{}", src.line);
            }
        }
        self.printer.finish(b, on);
        unit_sep(b);
    }

    fn write_time(&self, b: &mut Buffer, _s: &mut JournalState, t: DateTime<Utc>) {
        self.printer.styled(
            b,
            PRINT_TIMESTAMP,
            &t.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        unit_sep(b);
    }

    fn write_message(&self, b: &mut Buffer, _s: &mut JournalState, msg: &str) {
        self.printer.styled(b, PRINT_MESSAGE, msg);
        group_sep(b);
    }

    fn append_key(&self, b: &mut Buffer, s: &mut JournalState, k: &str) {
        let on = self.printer.begin(b, PRINT_KEY);
        if !s.prefix().is_empty() {
            b.extend_from_slice(s.prefix());
            b.push(b'.');
        }
        b.extend_from_slice(k.as_bytes());
        self.printer.finish(b, on);
        b.push(b'=');
    }

    fn append_string(&self, b: &mut Buffer, _s: &mut JournalState, v: &str) {
        self.printer.string(b, v);
        unit_sep(b);
    }

    fn append_bool(&self, b: &mut Buffer, _s: &mut JournalState, v: bool) {
        let slot = if v { PRINT_TRUE } else { PRINT_FALSE };
        self.printer
            .styled(b, slot, if v { "true" } else { "false" });
        unit_sep(b);
    }

    fn append_int64(&self, b: &mut Buffer, _s: &mut JournalState, v: i64) {
        let on = self.printer.begin(b, PRINT_NUMBER);
        let _ = write!(&mut **b, "{}", v);
        self.printer.finish(b, on);
        unit_sep(b);
    }

    fn append_uint64(&self, b: &mut Buffer, _s: &mut JournalState, v: u64) {
        let on = self.printer.begin(b, PRINT_NUMBER);
        let _ = write!(&mut **b, "{}", v);
        self.printer.finish(b, on);
        unit_sep(b);
    }

    fn append_float64(&self, b: &mut Buffer, _s: &mut JournalState, v: f64) {
        let on = self.printer.begin(b, PRINT_NUMBER);
        let _ = write!(&mut **b, "{}", v);
        self.printer.finish(b, on);
        unit_sep(b);
    }

    fn append_time(&self, b: &mut Buffer, _s: &mut JournalState, t: DateTime<Utc>) {
        self.printer.styled(
            b,
            PRINT_TIME,
            &t.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        unit_sep(b);
    }

    fn append_duration(&self, b: &mut Buffer, _s: &mut JournalState, d: Duration) {
        let on = self.printer.begin(b, PRINT_DURATION);
        append_duration_str(b, d);
        self.printer.finish(b, on);
        unit_sep(b);
    }

    fn append_any(&self, b: &mut Buffer, _s: &mut JournalState, v: &AnyValue) -> Result<()> {
        match v {
            AnyValue::Url(u) => self.printer.url(b, u),
            AnyValue::Error(err) => self.printer.styled(b, PRINT_ERROR_VAL, &err.to_string()),
            AnyValue::Text(m) => {
                let t = m.marshal_text().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                self.printer.styled(b, PRINT_TEXT, &t);
            }
            AnyValue::Display(v) => self.printer.string(b, &v.to_string()),
            AnyValue::Debug(v) => self.printer.styled(b, PRINT_GO_STRING, &format!("{:?}", v)),
            AnyValue::Binary(m) => {
                let o = m.marshal_binary().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                self.printer.styled(b, PRINT_BINARY, &BASE64_NO_PAD.encode(o));
            }
            AnyValue::Bytes(bin) => {
                let on = self.printer.begin(b, PRINT_BINARY);
                for c in bin {
                    b.push(HEX[(c >> 4) as usize]);
                    b.push(HEX[(c & 0xf) as usize]);
                }
                self.printer.finish(b, on);
            }
            AnyValue::Json(m) => {
                let o = m.marshal_json().map_err(|source| Error::Marshal {
                    source,
                    back: Backtrace::new(),
                })?;
                let on = self.printer.begin(b, PRINT_JSON);
                b.extend_from_slice(&o);
                self.printer.finish(b, on);
            }
            AnyValue::Reflect(j) => {
                let on = self.printer.begin(b, PRINT_REFLECT);
                let _ = write!(&mut **b, "{}", j);
                self.printer.finish(b, on);
            }
        }
        unit_sep(b);
        Ok(())
    }

    fn push_group(&self, _b: &mut Buffer, s: &mut JournalState, name: &str) {
        s.push_group(name);
    }

    fn pop_group(&self, _b: &mut Buffer, s: &mut JournalState) {
        s.pop_group();
    }
}
