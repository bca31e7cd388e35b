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

//! Request-scoped context
//! ======================
//!
//! # Introduction
//!
//! A [`Context`] carries the three pieces of contextual data a handler consults when emitting a
//! record: distributed-tracing baggage members (W3C Baggage style), profiler-attribution labels,
//! and an optional minimum-level override. The handler reads them; it never waits on a context,
//! and a write in progress is not interruptible by one.
//!
//! # Baggage values
//!
//! Baggage values live on the wire in the W3C [Baggage] value syntax, which permits only a
//! subset of ASCII. [`Context::with_values`] percent-encodes anything outside that subset
//! (including each byte of a multi-byte UTF-8 sequence) so arbitrary strings can ride along.
//! The encoding is idempotent: a `%HH` triple produced by a prior pass is recognized and left
//! alone.
//!
//! [Baggage]: https://www.w3.org/TR/baggage/

use crate::level::Level;

/// Request-scoped data consulted while emitting records.
#[derive(Clone, Debug, Default)]
pub struct Context {
    baggage: Vec<(String, String)>,
    labels: Vec<(String, String)>,
    level: Option<Level>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Override the minimum log level for all records emitted with this context.
    ///
    /// Takes precedence over the handler's configured level, even when lower.
    pub fn with_level(mut self, l: Level) -> Context {
        self.level = Some(l);
        self
    }

    /// The per-context level override, if any.
    pub fn level_override(&self) -> Option<Level> {
        self.level
    }

    /// Attach a profiler-attribution label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Context {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Visit the attached labels in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Visit the baggage members in declaration order. Values are as stored, i.e. already
    /// percent-encoded if they needed it.
    pub fn baggage(&self) -> impl Iterator<Item = (&str, &str)> {
        self.baggage.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add baggage members from alternating key/value pairs.
    ///
    /// Any trailing value is silently dropped. Values are percent-encoded as needed; keys that
    /// are not valid baggage keys are skipped. Setting a key already present replaces its value
    /// in place, preserving member order.
    pub fn with_values(mut self, pairs: &[&str]) -> Context {
        let pairs = &pairs[..pairs.len() - pairs.len() % 2];
        for kv in pairs.chunks_exact(2) {
            let (k, mut v) = (kv[0], kv[1].to_string());
            if !valid_key(k) {
                continue;
            }
            if needs_escape(&v) {
                v = escape_value(&v);
            }
            match self.baggage.iter_mut().find(|(bk, _)| bk == k) {
                Some((_, bv)) => *bv = v,
                None => self.baggage.push((k.to_string(), v)),
            }
        }
        self
    }
}

/// A baggage key is an RFC 7230 token.
fn valid_key(k: &str) -> bool {
    !k.is_empty()
        && k.bytes().all(|c| {
            c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&c)
        })
}

/// Report whether a baggage value contains anything outside the allowed octets, treating an
/// existing `%HH` triple as allowed.
fn needs_escape(v: &str) -> bool {
    let b = v.as_bytes();
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'%' => {
                if i + 2 >= b.len()
                    || !b[i + 1].is_ascii_hexdigit()
                    || !b[i + 2].is_ascii_hexdigit()
                {
                    return true;
                }
                i += 3;
            }
            c if allowed_octet(c) => i += 1,
            _ => return true,
        }
    }
    false
}

/// The baggage-value octet set: printable ASCII minus space, DQUOTE, comma, semicolon &
/// backslash.
fn allowed_octet(c: u8) -> bool {
    matches!(c, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e)
}

/// Percent-encode the octets of `v` that cannot appear in a baggage value.
///
/// Existing `%HH` triples are copied through untouched, which is what makes the encoding
/// idempotent.
fn escape_value(v: &str) -> String {
    let b = v.as_bytes();
    let mut out = String::with_capacity(b.len());
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        if c == b'%'
            && i + 2 < b.len()
            && b[i + 1].is_ascii_hexdigit()
            && b[i + 2].is_ascii_hexdigit()
        {
            out.push('%');
            out.push(b[i + 1] as char);
            out.push(b[i + 2] as char);
            i += 3;
            continue;
        }
        if c != b'%' && allowed_octet(c) {
            out.push(c as char);
        } else {
            out.push_str(&format!("%{:02X}", c));
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod baggage_tests {
    use super::*;

    #[test]
    fn reserved_separators_are_escaped() {
        let ctx = Context::new().with_values(&["k", "no bad news\",;\\"]);
        let got: Vec<_> = ctx.baggage().collect();
        assert_eq!(got, vec![("k", "no%20bad%20news%22%2C%3B%5C")]);
    }

    #[test]
    fn escape_is_idempotent() {
        for v in ["no bad news\",;\\", "percent: 100%", "héllo", "plain"] {
            let once = if needs_escape(v) {
                escape_value(v)
            } else {
                v.to_string()
            };
            let twice = if needs_escape(&once) {
                escape_value(&once)
            } else {
                once.clone()
            };
            assert_eq!(once, twice, "value: {:?}", v);
        }
    }

    #[test]
    fn multibyte_sequences_escape_per_byte() {
        let ctx = Context::new().with_values(&["k", "é"]);
        let got: Vec<_> = ctx.baggage().collect();
        assert_eq!(got, vec![("k", "%C3%A9")]);
    }

    #[test]
    fn trailing_value_is_dropped() {
        let ctx = Context::new().with_values(&["a", "1", "dangling"]);
        let got: Vec<_> = ctx.baggage().collect();
        assert_eq!(got, vec![("a", "1")]);
    }

    #[test]
    fn replacement_preserves_order() {
        let ctx = Context::new()
            .with_values(&["a", "1", "b", "2"])
            .with_values(&["a", "3"]);
        let got: Vec<_> = ctx.baggage().collect();
        assert_eq!(got, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn passthrough_values_are_untouched() {
        let ctx = Context::new().with_values(&["k", "already-fine.value"]);
        let got: Vec<_> = ctx.baggage().collect();
        assert_eq!(got, vec![("k", "already-fine.value")]);
    }
}
