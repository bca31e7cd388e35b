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

//! End-to-end checks against the public API, one per documented behavior.

use zlog::{AnyValue, Attr, Context, Error, Handler, Level, Options, Record, Value};

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An [`std::io::Write`] implementation whose contents can be read back out from the test.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(b);
        Ok(b.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn quiet_opts() -> Options {
    Options {
        omit_time: true,
        omit_source: true,
        ..Default::default()
    }
}

fn json_handler(opts: Options) -> (SharedBuf, Handler) {
    let sink = SharedBuf::default();
    let h = Handler::new(sink.clone(), Some(opts));
    (sink, h)
}

#[test]
fn default_json_single_attr() {
    let (sink, h) = json_handler(quiet_opts());
    h.handle(
        &Context::new(),
        &Record::new(Level::INFO, "test").with_attrs(vec![Attr::new("a", "b")]),
    )
    .unwrap();
    assert_eq!(sink.contents(), "{\"level\":\"INFO\",\"msg\":\"test\",\"a\":\"b\"}\n");
}

#[test]
fn derivation_plus_group() {
    let (sink, h) = json_handler(quiet_opts());
    let h = h.with_attrs(vec![Attr::new("a", "b")]).with_group("g");
    h.handle(
        &Context::new(),
        &Record::new(Level::INFO, "test").with_attrs(vec![Attr::new("c", "d")]),
    )
    .unwrap();
    assert_eq!(
        sink.contents(),
        "{\"level\":\"INFO\",\"msg\":\"test\",\"a\":\"b\",\"g\":{\"c\":\"d\"}}\n"
    );
}

#[test]
fn baggage_members_are_emitted() {
    let (sink, h) = json_handler(Options {
        baggage: Some(Box::new(|_| true)),
        ..quiet_opts()
    });
    let ctx = Context::new().with_values(&["test_kind", "example"]);
    h.handle(&ctx, &Record::new(Level::INFO, "test")).unwrap();
    assert_eq!(
        sink.contents(),
        "{\"level\":\"INFO\",\"msg\":\"test\",\"baggage\":{\"test_kind\":\"example\"}}\n"
    );
}

#[test]
fn profiler_labels_are_emitted() {
    let (sink, h) = json_handler(quiet_opts());
    let ctx = Context::new().with_label("test_kind", "example");
    h.handle(&ctx, &Record::new(Level::INFO, "test")).unwrap();
    assert_eq!(
        sink.contents(),
        "{\"level\":\"INFO\",\"msg\":\"test\",\"goroutine\":{\"test_kind\":\"example\"}}\n"
    );
}

#[test]
fn per_context_level() {
    let (sink, h) = json_handler(quiet_opts());
    let ctx = Context::new().with_level(Level::ERROR);
    h.handle(&ctx, &Record::new(Level::INFO, "dropped")).unwrap();
    assert_eq!(sink.contents(), "");
    h.handle(&ctx, &Record::new(Level::ERROR, "kept")).unwrap();
    assert_eq!(sink.contents(), "{\"level\":\"ERROR\",\"msg\":\"kept\"}\n");
}

#[test]
fn escaped_baggage_values_ride_along() {
    let (sink, h) = json_handler(Options {
        baggage: Some(Box::new(|_| true)),
        ..quiet_opts()
    });
    let ctx = Context::new().with_values(&["k", "no bad news\",;\\"]);
    h.handle(&ctx, &Record::new(Level::INFO, "test")).unwrap();
    assert!(
        sink.contents()
            .contains("\"k\":\"no%20bad%20news%22%2C%3B%5C\""),
        "got: {}",
        sink.contents()
    );
}

#[test]
fn json_round_trips_nested_groups() {
    let (sink, h) = json_handler(quiet_opts());
    let r = Record::new(Level::INFO, "rt").with_attrs(vec![
        Attr::new("top", 1i64),
        Attr::group(
            "g1",
            vec![
                Attr::new("a", "x"),
                Attr::group("g2", vec![Attr::new("b", true), Attr::new("c", 1.5f64)]),
            ],
        ),
        Attr::new("", "elided"),
        Attr::group("empty", vec![]),
    ]);
    h.handle(&Context::new(), &r).unwrap();

    let v: serde_json::Value = serde_json::from_str(sink.contents().trim_end()).unwrap();
    assert_eq!(v["level"], "INFO");
    assert_eq!(v["msg"], "rt");
    assert_eq!(v["top"], 1);
    assert_eq!(v["g1"]["a"], "x");
    assert_eq!(v["g1"]["g2"]["b"], true);
    assert_eq!(v["g1"]["g2"]["c"], 1.5);
    let obj = v.as_object().unwrap();
    assert!(!obj.contains_key(""), "empty key must be absent");
    assert!(!obj.contains_key("empty"), "empty group must be absent");
}

#[test]
fn value_kinds_encode() {
    let (sink, h) = json_handler(quiet_opts());
    let r = Record::new(Level::INFO, "kinds").with_attrs(vec![
        Attr::new("bool", true),
        Attr::new("int", -3i64),
        Attr::new("uint", 7u64),
        Attr::new("float", 0.5f64),
        Attr::new("dur", Duration::from_millis(1200)),
        Attr::new("err", Value::Any(AnyValue::Error("boom".into()))),
        Attr::new("url", Value::Any(AnyValue::Url("https://example.com/".into()))),
        Attr::new("lazy", Value::lazy(|| Value::Int64(42))),
        Attr::new(
            "reflect",
            Value::reflect(&serde_json::json!({"nested": [1, 2, 3]})),
        ),
    ]);
    h.handle(&Context::new(), &r).unwrap();

    let v: serde_json::Value = serde_json::from_str(sink.contents().trim_end()).unwrap();
    assert_eq!(v["bool"], true);
    assert_eq!(v["int"], -3);
    assert_eq!(v["uint"], 7);
    assert_eq!(v["float"], 0.5);
    assert_eq!(v["dur"], "1.2s");
    assert_eq!(v["err"], "boom");
    assert_eq!(v["url"], "https://example.com/");
    assert_eq!(v["lazy"], 42);
    assert_eq!(v["reflect"]["nested"], serde_json::json!([1, 2, 3]));
}

#[test]
fn prose_framing() {
    let sink = SharedBuf::default();
    let h = Handler::new(
        sink.clone(),
        Some(Options {
            prose_format: true,
            ..quiet_opts()
        }),
    );
    let h = h.with_group("g");
    h.handle(
        &Context::new(),
        &Record::new(Level::INFO, "test").with_attrs(vec![
            Attr::new("a", "b"),
            Attr::new("n", 3i64),
        ]),
    )
    .unwrap();
    assert_eq!(
        sink.contents(),
        "INFO \u{1f} test\u{1d} g.a=\"b\"\u{1f} g.n=3\u{1f}\u{1e}\n"
    );
}

#[test]
fn prose_is_unstyled_off_terminal() {
    let sink = SharedBuf::default();
    let h = Handler::new(
        sink.clone(),
        Some(Options {
            prose_format: true,
            ..quiet_opts()
        }),
    );
    h.handle(&Context::new(), &Record::new(Level::ERROR, "plain"))
        .unwrap();
    assert!(
        !sink.contents().contains('\x1b'),
        "unexpected escapes: {:?}",
        sink.contents()
    );
}

#[test]
fn short_writes_surface_and_hit_the_hook() {
    #[derive(Clone)]
    struct Short;
    impl Write for Short {
        fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
            Ok(b.len() - 1)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    let hits = Arc::new(Mutex::new(0usize));
    let hook = Arc::clone(&hits);
    let h = Handler::new(
        Short,
        Some(Options {
            write_error: Some(Box::new(move |_, _| {
                *hook.lock().unwrap() += 1;
            })),
            ..quiet_opts()
        }),
    );
    let err = h
        .handle(&Context::new(), &Record::new(Level::INFO, "m"))
        .unwrap_err();
    assert!(matches!(err, Error::ShortWrite { .. }));
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn failed_records_do_not_disable_the_handler() {
    struct Flaky {
        fail_next: Arc<Mutex<bool>>,
    }
    impl Write for Flaky {
        fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "down"));
            }
            Ok(b.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    let fail_next = Arc::new(Mutex::new(true));
    let h = Handler::new(
        Flaky {
            fail_next: Arc::clone(&fail_next),
        },
        Some(quiet_opts()),
    );
    let ctx = Context::new();
    assert!(h.handle(&ctx, &Record::new(Level::INFO, "lost")).is_err());
    assert!(h.handle(&ctx, &Record::new(Level::INFO, "fine")).is_ok());
}

#[test]
fn concurrent_records_never_interleave() {
    let (sink, h) = json_handler(quiet_opts());
    let h = Arc::new(h);
    let mut handles = Vec::new();
    for i in 0..8 {
        let h = Arc::clone(&h);
        handles.push(std::thread::spawn(move || {
            let ctx = Context::new();
            for j in 0..50 {
                h.handle(
                    &ctx,
                    &Record::new(Level::INFO, "concurrent")
                        .with_attrs(vec![Attr::new("t", i as i64), Attr::new("j", j as i64)]),
                )
                .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let contents = sink.contents();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 400);
    for line in lines {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(v["msg"], "concurrent");
    }
}
