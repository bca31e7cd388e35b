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

//! [zlog](crate) [`Layer`] implementation
//! ======================================
//!
//! # Introduction
//!
//! [`Layer`] adapts a [`Handler`] into a [`tracing_subscriber::Layer`], so the usual
//! `tracing` macros can feed it:
//!
//! ```rust
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//! use tracing_subscriber::registry::Registry;
//! use zlog::{Handler, Layer, Options};
//!
//! let handler = Handler::stderr(Some(Options {
//!     omit_time: true,
//!     ..Default::default()
//! }));
//! let subscriber = Registry::default().with(Layer::new(handler));
//! ```
//!
//! # Discussion
//!
//! `tracing` has no per-call context argument, so the contextual data a [`Handler`] draws on
//! (baggage, labels, level override) comes from a [`Context`] attached to the layer at
//! construction via [`Layer::with_context`]. Write errors are not reported through `tracing`;
//! route them through [`Options::write_error`](crate::Options) instead.

use crate::context::Context;
use crate::handler::Handler;
use crate::level::Level;
use crate::record::{Attr, Record, Source, Value};

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::registry::LookupSpan;

/// A [`tracing_subscriber::Layer`] forwarding events to a [`Handler`].
pub struct Layer {
    handler: Handler,
    ctx: Context,
}

impl Layer {
    pub fn new(handler: Handler) -> Layer {
        Layer {
            handler,
            ctx: Context::new(),
        }
    }

    /// Attach contextual data (baggage, labels, a level override) consulted for every event
    /// this layer forwards.
    pub fn with_context(mut self, ctx: Context) -> Layer {
        self.ctx = ctx;
        self
    }
}

/// Map a `tracing` verbosity to a record severity. `TRACE` has no named analog and lands
/// below [`Level::DEBUG`].
fn level_from_tracing(l: &tracing::Level) -> Level {
    match *l {
        tracing::Level::ERROR => Level::ERROR,
        tracing::Level::WARN => Level::WARN,
        tracing::Level::INFO => Level::INFO,
        tracing::Level::DEBUG => Level::DEBUG,
        tracing::Level::TRACE => Level(Level::DEBUG.0 - 4),
    }
}

/// Collects an event's fields: `message` is pulled out, the rest become attributes in
/// declaration order.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attrs.push(Attr::new(field.name(), value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The tracing macros pre-format the message field so the Debug form prints without
        // enclosing double-quotes.
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.attrs
                .push(Attr::new(field.name(), Value::String(format!("{:?}", value))));
        }
    }
}

impl<S> tracing_subscriber::layer::Layer<S> for Layer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let meta = event.metadata();
        let level = level_from_tracing(meta.level());
        if !self.handler.enabled(&self.ctx, level) {
            return;
        }
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let rec = Record {
            level,
            source: meta.file().map(|f| Source {
                function: None,
                file: f.to_string(),
                line: meta.line().unwrap_or(0),
            }),
            time: Some(Utc::now()),
            message: visitor.message.unwrap_or_default(),
            attrs: visitor.attrs,
        };
        // Errors are routed through the handler's write_error hook, when one is configured.
        let _ = self.handler.handle(&self.ctx, &rec);
    }
}

#[cfg(test)]
mod layer_tests {
    use super::*;
    use crate::handler::Options;

    use std::sync::{Arc, Mutex};

    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(b);
            Ok(b.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_become_records() {
        let sink = SharedBuf::default();
        let h = Handler::new(
            sink.clone(),
            Some(Options {
                omit_time: true,
                omit_source: true,
                ..Default::default()
            }),
        );
        let subscriber = tracing_subscriber::registry::Registry::default().with(Layer::new(h));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(a = "b", "test");
            tracing::debug!("dropped by level");
        });
        let got = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(got, "{\"level\":\"INFO\",\"msg\":\"test\",\"a\":\"b\"}\n");
    }
}
