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

//! The record-assembly pipeline
//! ============================
//!
//! # Introduction
//!
//! [`Handler`] is the public face of this crate: it owns a destination, a format, and the
//! pre-formatted bytes of any inherited attributes, and turns each [`Record`] into one framed
//! unit on the wire. The per-record sequence is fixed: start, level, source, time, message,
//! baggage, profiler labels, inherited attributes, record attributes, end, write.
//!
//! # Derivation
//!
//! [`with_attrs`](Handler::with_attrs) encodes its attributes *once*, into a clone of the
//! handler's pre-formatted buffer, so records emitted through the derived handler just splice
//! those bytes in. [`with_group`](Handler::with_group) opens the group in the clone and extends
//! the group stack. Derived handlers share the writer (and its mutex), options & format with
//! their base; the pre-formatted buffer is owned by exactly one handler, and `Handler` is
//! deliberately not `Clone`, so it cannot be aliased.

use crate::buffer::Buffer;
use crate::context::Context;
use crate::detect;
use crate::error::{Error, Result};
use crate::formatter::{Format, FormatState};
use crate::json::JsonFormat;
#[cfg(any(target_os = "linux", test))]
use crate::journal::JournalFormat;
use crate::level::Level;
use crate::prose::{AnsiPrinter, ProseFormat};
use crate::record::{Attr, Record, Value};
use crate::transport::{SyncWriter, Transport};

use backtrace::Backtrace;

use std::io::{IsTerminal, Write};
use std::sync::Arc;

/// Configuration for a [`Handler`].
#[derive(Default)]
pub struct Options {
    /// The minimum level a record must have to be emitted.
    ///
    /// `None` means [`Level::INFO`]. Can be overridden per-record by
    /// [`Context::with_level`].
    pub level: Option<Level>,
    /// A selection function for baggage keys; when present, accepted members of the record
    /// context's baggage are emitted with every record.
    pub baggage: Option<Box<dyn Fn(&str) -> bool + Send + Sync>>,
    /// A hook for receiving errors that occurred while attempting to write a record, for
    /// callers that fire and forget.
    pub write_error: Option<Box<dyn Fn(&Context, &Error) + Send + Sync>>,
    /// Suppress source position information.
    pub omit_source: bool,
    /// Suppress timestamps.
    pub omit_time: bool,
    /// Emit the prose format rather than JSON. Has no effect when connected to the journal.
    pub prose_format: bool,
    /// Force ANSI color output regardless of terminal detection. A testing hook.
    #[doc(hidden)]
    pub force_ansi: bool,
}

/// The inner, format-generic handler.
pub(crate) struct Sink<F: Format> {
    out: Arc<dyn Transport>,
    opts: Arc<Options>,
    format: Arc<F>,
    /// Attributes inherited from ancestor derivations, already encoded.
    prefmt: Buffer,
    /// Names of the groups all record attributes land under.
    groups: Vec<String>,
    /// How many group-opens dangle at the tail of `prefmt`; formats that elide empty groups
    /// need to know.
    trailing_opens: usize,
}

impl<F: Format> Sink<F> {
    pub(crate) fn new(out: Arc<dyn Transport>, opts: Arc<Options>, format: Arc<F>) -> Sink<F> {
        Sink {
            out,
            opts,
            format,
            prefmt: Buffer::new(),
            groups: Vec::new(),
            trailing_opens: 0,
        }
    }

    fn enabled(&self, ctx: &Context, l: Level) -> bool {
        let mut min = self.opts.level.unwrap_or(Level::INFO);
        if let Some(cl) = ctx.level_override() {
            min = cl;
        }
        l >= min
    }

    fn handle(&self, ctx: &Context, r: &Record) -> Result<()> {
        if !self.enabled(ctx, r.level) {
            return Ok(());
        }
        let mut b = Buffer::new();
        let pool = F::State::pool();
        let mut s = pool.get(&self.groups, Some(&self.prefmt));
        let f = &*self.format;
        f.start(&mut b, &mut s);

        // Default keys:
        f.write_level(&mut b, &mut s, r.level);
        if !self.opts.omit_source {
            if let Some(src) = &r.source {
                f.write_source(&mut b, &mut s, src);
            }
        }
        if !self.opts.omit_time {
            if let Some(t) = r.time {
                f.write_time(&mut b, &mut s, t);
            }
        }
        f.write_message(&mut b, &mut s, &r.message);

        // Add baggage if a filter function is present.
        if let Some(filter) = &self.opts.baggage {
            let mut grouped = false;
            for (k, v) in ctx.baggage() {
                if !filter(k) {
                    continue;
                }
                if !grouped {
                    f.push_group(&mut b, &mut s, f.baggage_key());
                    grouped = true;
                }
                f.append_key(&mut b, &mut s, k);
                f.append_string(&mut b, &mut s, v);
            }
            if grouped {
                f.pop_group(&mut b, &mut s);
            }
        }
        // Add profiler labels if present.
        {
            let mut grouped = false;
            for (k, v) in ctx.labels() {
                if !grouped {
                    f.push_group(&mut b, &mut s, f.pprof_key());
                    grouped = true;
                }
                f.append_key(&mut b, &mut s, k);
                f.append_string(&mut b, &mut s, v);
            }
            if grouped {
                f.pop_group(&mut b, &mut s);
            }
        }

        // Add the attached attrs.
        b.extend_from_slice(&self.prefmt);
        s.splice_preformatted(self.trailing_opens);
        let mut err = None;
        for a in &r.attrs {
            if let Err(e) = self.append_attr(&mut b, &mut s, a) {
                // Stop at the failing attribute, but still write the record through so the
                // keys before it are not lost.
                err = Some(e);
                break;
            }
        }

        // Finish and send.
        f.end(&mut b, &mut s);
        let res = self.out.send(&b);
        let n = b.len();
        pool.put(s);
        let err = match (err, res) {
            (Some(e), _) => Some(e),
            (None, Err(e)) => Some(Error::from(e)),
            (None, Ok(written)) if written != n => Some(Error::ShortWrite {
                back: Backtrace::new(),
            }),
            (None, Ok(_)) => None,
        };
        match err {
            Some(e) => {
                if let Some(sink) = &self.opts.write_error {
                    sink(ctx, &e);
                }
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Fully resolve the attribute's value, then call the appropriate formatting hooks.
    fn append_attr(&self, b: &mut Buffer, s: &mut F::State, a: &Attr) -> Result<()> {
        let f = &*self.format;
        let v = a.value.resolve();
        if let Value::Group(attrs) = &*v {
            if !attrs.is_empty() {
                if !a.key.is_empty() {
                    f.push_group(b, s, &a.key);
                }
                for ga in attrs {
                    self.append_attr(b, s, ga)?;
                }
                if !a.key.is_empty() {
                    f.pop_group(b, s);
                }
            }
            return Ok(());
        }
        if a.key.is_empty() {
            return Ok(());
        }
        f.append_key(b, s, &a.key);
        match &*v {
            Value::Bool(x) => f.append_bool(b, s, *x),
            Value::Int64(x) => f.append_int64(b, s, *x),
            Value::Uint64(x) => f.append_uint64(b, s, *x),
            Value::Float64(x) => f.append_float64(b, s, *x),
            Value::String(x) => f.append_string(b, s, x),
            Value::Duration(x) => f.append_duration(b, s, *x),
            Value::Time(x) => f.append_time(b, s, *x),
            Value::Any(x) => f.append_any(b, s, x)?,
            Value::Group(_) | Value::Lazy(_) => unreachable!("resolved above"),
        }
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Sink<F> {
        let mut p = self.prefmt.clone();
        let before = p.len();
        let pool = F::State::pool();
        let mut s = pool.get(&self.groups, Some(&self.prefmt));
        for a in &attrs {
            let _ = self.append_attr(&mut p, &mut s, a);
        }
        pool.put(s);
        let trailing_opens = if p.len() == before {
            self.trailing_opens
        } else {
            0
        };
        Sink {
            out: Arc::clone(&self.out),
            opts: Arc::clone(&self.opts),
            format: Arc::clone(&self.format),
            prefmt: p,
            groups: self.groups.clone(),
            trailing_opens,
        }
    }

    fn with_group(&self, name: &str) -> Sink<F> {
        let mut p = self.prefmt.clone();
        let pool = F::State::pool();
        let mut s = pool.get(&self.groups, None);
        self.format.push_group(&mut p, &mut s, name);
        pool.put(s);
        let mut groups = self.groups.clone();
        groups.push(name.to_string());
        Sink {
            out: Arc::clone(&self.out),
            opts: Arc::clone(&self.opts),
            format: Arc::clone(&self.format),
            prefmt: p,
            groups,
            trailing_opens: self.trailing_opens + 1,
        }
    }
}

/// A handler emitting records to a writer in one of the three wire formats.
///
/// Construct one with [`Handler::stderr`], [`Handler::stdout`] or [`Handler::new`]; derive
/// cheap variants with [`with_attrs`](Handler::with_attrs) &
/// [`with_group`](Handler::with_group). Handlers are safe to share across threads; the bytes of
/// a single record are contiguous in the output and records never interleave.
pub struct Handler(Inner);

enum Inner {
    Json(Sink<JsonFormat>),
    Prose(Sink<ProseFormat>),
    #[cfg(target_os = "linux")]
    Journal(Sink<JournalFormat>),
}

impl Handler {
    /// A handler emitting records to stderr.
    ///
    /// If `None` is passed for options, suitable defaults are used: in particular, timestamps
    /// are omitted when the process is detected to run inside Kubernetes or under a journald
    /// stream, since the downstream collector is trusted to stamp. On Linux, when the process
    /// is attached to the journal, the returned handler speaks the native journald protocol
    /// instead of writing to stderr at all.
    pub fn stderr(opts: Option<Options>) -> Handler {
        let opts = Self::resolve_opts(opts);
        #[cfg(target_os = "linux")]
        if detect::journal_stream() {
            return Handler(Inner::Journal(Sink::new(
                Arc::new(crate::transport::JournalTransport),
                Arc::new(opts),
                Arc::new(JournalFormat),
            )));
        }
        let tty = std::io::stderr().is_terminal();
        Self::build(std::io::stderr(), opts, tty)
    }

    /// A handler emitting records to stdout. Never upgrades to the journal protocol.
    pub fn stdout(opts: Option<Options>) -> Handler {
        let opts = Self::resolve_opts(opts);
        let tty = std::io::stdout().is_terminal();
        Self::build(std::io::stdout(), opts, tty)
    }

    /// A handler emitting records to an arbitrary writer.
    ///
    /// The writer is assumed not to be a terminal, so prose output is unstyled unless
    /// `force_ansi` is set.
    pub fn new<W: Write + Send + 'static>(w: W, opts: Option<Options>) -> Handler {
        let opts = Self::resolve_opts(opts);
        Self::build(w, opts, false)
    }

    fn resolve_opts(opts: Option<Options>) -> Options {
        opts.unwrap_or_else(|| Options {
            omit_time: detect::in_k8s() || detect::journal_stream(),
            ..Default::default()
        })
    }

    fn build<W: Write + Send + 'static>(w: W, opts: Options, tty: bool) -> Handler {
        let styled = opts.force_ansi || (tty && !no_color());
        let out: Arc<dyn Transport> = Arc::new(SyncWriter::new(w));
        let opts = Arc::new(opts);
        if opts.prose_format {
            let printer = if styled {
                AnsiPrinter::from_env()
            } else {
                AnsiPrinter::disabled()
            };
            Handler(Inner::Prose(Sink::new(out, opts, Arc::new(ProseFormat { printer }))))
        } else {
            Handler(Inner::Json(Sink::new(out, opts, Arc::new(JsonFormat))))
        }
    }

    /// Report whether a record at level `l` emitted with `ctx` would be written.
    pub fn enabled(&self, ctx: &Context, l: Level) -> bool {
        match &self.0 {
            Inner::Json(h) => h.enabled(ctx, l),
            Inner::Prose(h) => h.enabled(ctx, l),
            #[cfg(target_os = "linux")]
            Inner::Journal(h) => h.enabled(ctx, l),
        }
    }

    /// Emit one record.
    ///
    /// A record below the minimum level (or the context's override) is a no-op. A failed
    /// record does not disable the handler; the error is returned, and delivered to the
    /// options' `write_error` hook when one is set.
    pub fn handle(&self, ctx: &Context, r: &Record) -> Result<()> {
        match &self.0 {
            Inner::Json(h) => h.handle(ctx, r),
            Inner::Prose(h) => h.handle(ctx, r),
            #[cfg(target_os = "linux")]
            Inner::Journal(h) => h.handle(ctx, r),
        }
    }

    /// A handler that emits `attrs` with every record, ahead of the record's own attributes.
    ///
    /// The attributes are encoded now, once.
    pub fn with_attrs(&self, attrs: Vec<Attr>) -> Handler {
        Handler(match &self.0 {
            Inner::Json(h) => Inner::Json(h.with_attrs(attrs)),
            Inner::Prose(h) => Inner::Prose(h.with_attrs(attrs)),
            #[cfg(target_os = "linux")]
            Inner::Journal(h) => Inner::Journal(h.with_attrs(attrs)),
        })
    }

    /// A handler that nests every record's attributes under `name`.
    pub fn with_group(&self, name: &str) -> Handler {
        Handler(match &self.0 {
            Inner::Json(h) => Inner::Json(h.with_group(name)),
            Inner::Prose(h) => Inner::Prose(h.with_group(name)),
            #[cfg(target_os = "linux")]
            Inner::Journal(h) => Inner::Journal(h.with_group(name)),
        })
    }
}

/// The conventional meaning of [`NO_COLOR`]: set to anything non-empty means no styling.
///
/// [`NO_COLOR`]: https://no-color.org/
fn no_color() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod handler_tests {
    use super::*;
    use crate::record::AnyValue;

    use std::sync::Mutex;

    /// A [`Transport`] capturing every record it is sent.
    #[derive(Default)]
    struct Capture {
        recs: Mutex<Vec<Vec<u8>>>,
    }

    impl Transport for Capture {
        fn send(&self, rec: &[u8]) -> std::io::Result<usize> {
            self.recs.lock().unwrap().push(rec.to_vec());
            Ok(rec.len())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            self.recs
                .lock()
                .unwrap()
                .iter()
                .map(|r| String::from_utf8_lossy(r).into_owned())
                .collect()
        }
    }

    fn json_sink(opts: Options) -> (Arc<Capture>, Sink<JsonFormat>) {
        let cap = Arc::new(Capture::default());
        let sink = Sink::new(
            Arc::clone(&cap) as Arc<dyn Transport>,
            Arc::new(opts),
            Arc::new(JsonFormat),
        );
        (cap, sink)
    }

    #[test]
    fn single_attr() {
        let (cap, h) = json_sink(Options::default());
        let r = Record::new(Level::INFO, "test").with_attrs(vec![Attr::new("a", "b")]);
        h.handle(&Context::new(), &r).unwrap();
        assert_eq!(
            cap.lines(),
            vec!["{\"level\":\"INFO\",\"msg\":\"test\",\"a\":\"b\"}\n"]
        );
    }

    #[test]
    fn derivation_and_group() {
        let (cap, h) = json_sink(Options::default());
        let h = h.with_attrs(vec![Attr::new("a", "b")]).with_group("g");
        let r = Record::new(Level::INFO, "test").with_attrs(vec![Attr::new("c", "d")]);
        h.handle(&Context::new(), &r).unwrap();
        assert_eq!(
            cap.lines(),
            vec!["{\"level\":\"INFO\",\"msg\":\"test\",\"a\":\"b\",\"g\":{\"c\":\"d\"}}\n"]
        );
    }

    #[test]
    fn group_of_derived_handler_is_elided_when_unused() {
        let (cap, h) = json_sink(Options::default());
        let h = h.with_attrs(vec![Attr::new("a", "b")]).with_group("g");
        h.handle(&Context::new(), &Record::new(Level::INFO, "test"))
            .unwrap();
        assert_eq!(
            cap.lines(),
            vec!["{\"level\":\"INFO\",\"msg\":\"test\",\"a\":\"b\"}\n"]
        );
    }

    #[test]
    fn nested_unused_groups_are_elided() {
        let (cap, h) = json_sink(Options::default());
        let h = h.with_group("g1").with_group("g2");
        h.handle(&Context::new(), &Record::new(Level::INFO, "test"))
            .unwrap();
        assert_eq!(cap.lines(), vec!["{\"level\":\"INFO\",\"msg\":\"test\"}\n"]);
    }

    #[test]
    fn baggage_is_filtered_and_grouped() {
        let (cap, h) = json_sink(Options {
            baggage: Some(Box::new(|k| k != "dropped")),
            ..Default::default()
        });
        let ctx = Context::new().with_values(&["test_kind", "example", "dropped", "x"]);
        h.handle(&ctx, &Record::new(Level::INFO, "test")).unwrap();
        assert_eq!(
            cap.lines(),
            vec!["{\"level\":\"INFO\",\"msg\":\"test\",\"baggage\":{\"test_kind\":\"example\"}}\n"]
        );
    }

    #[test]
    fn labels_are_grouped() {
        let (cap, h) = json_sink(Options::default());
        let ctx = Context::new().with_label("test_kind", "example");
        h.handle(&ctx, &Record::new(Level::INFO, "test")).unwrap();
        assert_eq!(
            cap.lines(),
            vec!["{\"level\":\"INFO\",\"msg\":\"test\",\"goroutine\":{\"test_kind\":\"example\"}}\n"]
        );
    }

    #[test]
    fn context_level_overrides_options() {
        let (cap, h) = json_sink(Options {
            level: Some(Level::INFO),
            ..Default::default()
        });
        let quiet = Context::new().with_level(Level::ERROR);
        h.handle(&quiet, &Record::new(Level::INFO, "dropped"))
            .unwrap();
        assert!(cap.lines().is_empty());
        h.handle(&quiet, &Record::new(Level::ERROR, "kept")).unwrap();
        assert_eq!(cap.lines().len(), 1);

        // The override also lowers the bar.
        let chatty = Context::new().with_level(Level::EVERYTHING);
        let (cap, h) = json_sink(Options {
            level: Some(Level::ERROR),
            ..Default::default()
        });
        h.handle(&chatty, &Record::new(Level::DEBUG, "kept"))
            .unwrap();
        assert_eq!(cap.lines().len(), 1);
    }

    #[test]
    fn enabled_matches_handle() {
        let (cap, h) = json_sink(Options::default());
        let ctx = Context::new();
        for l in [Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            let before = cap.lines().len();
            h.handle(&ctx, &Record::new(l, "m")).unwrap();
            let wrote = cap.lines().len() > before;
            assert_eq!(h.enabled(&ctx, l), wrote, "level {}", l);
        }
    }

    #[test]
    fn with_attrs_matches_inline_attrs() {
        let (cap1, h1) = json_sink(Options::default());
        let derived = h1.with_attrs(vec![Attr::new("a", "b")]);
        derived
            .handle(
                &Context::new(),
                &Record::new(Level::INFO, "m").with_attrs(vec![Attr::new("c", "d")]),
            )
            .unwrap();

        let (cap2, h2) = json_sink(Options::default());
        h2.handle(
            &Context::new(),
            &Record::new(Level::INFO, "m")
                .with_attrs(vec![Attr::new("a", "b"), Attr::new("c", "d")]),
        )
        .unwrap();

        assert_eq!(cap1.lines(), cap2.lines());
    }

    #[test]
    fn short_writes_are_detected() {
        struct Short;
        impl Transport for Short {
            fn send(&self, rec: &[u8]) -> std::io::Result<usize> {
                Ok(rec.len() - 1)
            }
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook = Arc::clone(&seen);
        let h = Sink::new(
            Arc::new(Short),
            Arc::new(Options {
                write_error: Some(Box::new(move |_, e| {
                    hook.lock().unwrap().push(e.to_string());
                })),
                ..Default::default()
            }),
            Arc::new(JsonFormat),
        );
        let err = h
            .handle(&Context::new(), &Record::new(Level::INFO, "m"))
            .unwrap_err();
        assert!(matches!(err, Error::ShortWrite { .. }));
        assert_eq!(seen.lock().unwrap().as_slice(), ["short write"]);
    }

    #[test]
    fn marshal_errors_still_write_the_record() {
        struct Broken;
        impl crate::record::MarshalJson for Broken {
            fn marshal_json(
                &self,
            ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
                Err("busted".into())
            }
        }
        let (cap, h) = json_sink(Options::default());
        let r = Record::new(Level::INFO, "m").with_attrs(vec![
            Attr::new("ok", "fine"),
            Attr::new("bad", Value::Any(AnyValue::Json(Box::new(Broken)))),
        ]);
        let err = h.handle(&Context::new(), &r).unwrap_err();
        assert!(matches!(err, Error::Marshal { .. }));
        // The earlier key survived.
        let lines = cap.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"ok\":\"fine\""), "got: {}", lines[0]);
    }

    #[test]
    fn empty_keys_are_elided_but_group_children_survive() {
        let (cap, h) = json_sink(Options::default());
        let r = Record::new(Level::INFO, "m").with_attrs(vec![
            Attr::new("", "dropped"),
            Attr::group("", vec![Attr::new("inline", "kept")]),
        ]);
        h.handle(&Context::new(), &r).unwrap();
        assert_eq!(
            cap.lines(),
            vec!["{\"level\":\"INFO\",\"msg\":\"m\",\"inline\":\"kept\"}\n"]
        );
    }

    ////////////////////////////////////////////////////////////////////////////////////////////
    //                                  journal format, end to end                            //
    ////////////////////////////////////////////////////////////////////////////////////////////

    /// Decodes each write as a journald native-protocol record.
    #[derive(Default)]
    struct Emulator {
        recs: Mutex<Vec<Vec<(String, Vec<u8>)>>>,
    }

    impl Emulator {
        fn parse(mut b: &[u8]) -> Vec<(String, Vec<u8>)> {
            let mut out = Vec::new();
            while !b.is_empty() {
                let nl = b.iter().position(|&c| c == b'\n').unwrap();
                let line = &b[..nl];
                match line.iter().position(|&c| c == b'=') {
                    Some(eq) => {
                        out.push((
                            String::from_utf8(line[..eq].to_vec()).unwrap(),
                            line[eq + 1..].to_vec(),
                        ));
                        b = &b[nl + 1..];
                    }
                    None => {
                        // Binary frame: KEY \n <le u64 len> <bytes> \n
                        let key = String::from_utf8(line.to_vec()).unwrap();
                        let rest = &b[nl + 1..];
                        let len =
                            u64::from_le_bytes(rest[..8].try_into().unwrap()) as usize;
                        out.push((key, rest[8..8 + len].to_vec()));
                        assert_eq!(rest[8 + len], b'\n', "missing frame terminator");
                        b = &rest[8 + len + 1..];
                    }
                }
            }
            out
        }

        fn field<'a>(rec: &'a [(String, Vec<u8>)], key: &str) -> Option<&'a [u8]> {
            rec.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
        }
    }

    impl Transport for Emulator {
        fn send(&self, rec: &[u8]) -> std::io::Result<usize> {
            self.recs.lock().unwrap().push(Self::parse(rec));
            Ok(rec.len())
        }
    }

    fn journal_sink(opts: Options) -> (Arc<Emulator>, Sink<JournalFormat>) {
        let emu = Arc::new(Emulator::default());
        let sink = Sink::new(
            Arc::clone(&emu) as Arc<dyn Transport>,
            Arc::new(opts),
            Arc::new(JournalFormat),
        );
        (emu, sink)
    }

    #[test]
    fn journal_records() {
        let (emu, h) = journal_sink(Options::default());
        let ctx = Context::new();
        h.handle(&ctx, &Record::new(Level::INFO, "test")).unwrap();
        h.handle(&ctx, &Record::new(Level::WARN, "embedded\nnewline"))
            .unwrap();
        let giant = format!("gigantic:\n{}", "⍼".repeat(4096));
        h.handle(&ctx, &Record::new(Level::ERROR, giant.clone()))
            .unwrap();

        let recs = emu.recs.lock().unwrap();
        assert_eq!(Emulator::field(&recs[0], "PRIORITY"), Some(&b"6"[..]));
        assert_eq!(Emulator::field(&recs[0], "MESSAGE"), Some(&b"test"[..]));
        assert_eq!(Emulator::field(&recs[1], "PRIORITY"), Some(&b"4"[..]));
        assert_eq!(
            Emulator::field(&recs[1], "MESSAGE"),
            Some(&b"embedded\nnewline"[..])
        );
        assert_eq!(
            Emulator::field(&recs[2], "MESSAGE"),
            Some(giant.as_bytes())
        );
    }

    #[test]
    fn journal_group_keys_are_dotted() {
        let (emu, h) = journal_sink(Options::default());
        let h = h.with_group("g1").with_group("g2");
        h.handle(
            &Context::new(),
            &Record::new(Level::INFO, "m").with_attrs(vec![Attr::new("a", "v")]),
        )
        .unwrap();
        let recs = emu.recs.lock().unwrap();
        assert_eq!(Emulator::field(&recs[0], "g1.g2.a"), Some(&b"v"[..]));
    }

    #[test]
    fn journal_binary_values_are_length_prefixed() {
        let (emu, h) = journal_sink(Options::default());
        h.handle(
            &Context::new(),
            &Record::new(Level::INFO, "m").with_attrs(vec![Attr::new(
                "b",
                Value::Any(AnyValue::Bytes(vec![0, 1, 2, b'\n', 4])),
            )]),
        )
        .unwrap();
        let recs = emu.recs.lock().unwrap();
        assert_eq!(
            Emulator::field(&recs[0], "b"),
            Some(&[0u8, 1, 2, b'\n', 4][..])
        );
    }
}
