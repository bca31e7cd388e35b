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

//! The record data model
//! =====================
//!
//! # Introduction
//!
//! A [`Record`] is what a handler consumes: a severity, an optional source location, an optional
//! timestamp, a message, and an ordered sequence of [`Attr`]s. Attribute values are a closed set
//! of scalar kinds plus [`Value::Group`] (a named nesting level) and [`Value::Any`], the escape
//! hatch for caller-defined types.
//!
//! # Discussion
//!
//! A dynamic language runtime could interrogate an opaque value for marshaling interfaces at
//! encode time. Rust has no such thing, so [`AnyValue`] makes the capability explicit at
//! construction: the caller picks the variant
//! (an error, a fallible text/binary/JSON marshaler, a `Display` or `Debug` rendition, raw
//! bytes, a URL, or a [`serde_json::Value`] as the reflective fallback) and each encoder
//! dispatches on it.

use crate::level::Level;

use chrono::{DateTime, Utc};
use serde::Serialize;

use std::sync::Arc;
use std::time::Duration;

type StdResult<T, E> = std::result::Result<T, E>;
type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How many times a lazy value will be re-resolved before giving up.
const MAX_LAZY_RESOLVES: usize = 100;

/// A single log record, immutable during encoding.
pub struct Record {
    pub level: Level,
    /// Where the record was emitted, if known.
    pub source: Option<Source>,
    /// When the record was emitted. `None` means "don't know", which encoders treat as "don't
    /// emit".
    pub time: Option<DateTime<Utc>>,
    pub message: String,
    pub attrs: Vec<Attr>,
}

impl Record {
    /// Construct a record with no source, timestamp or attributes.
    pub fn new(level: Level, message: impl Into<String>) -> Record {
        Record {
            level,
            source: None,
            time: None,
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    /// Attach attributes, builder-style.
    pub fn with_attrs(mut self, attrs: Vec<Attr>) -> Record {
        self.attrs = attrs;
        self
    }
}

/// A source-code position.
pub struct Source {
    /// Fully-qualified function name, when the caller knows it.
    pub function: Option<String>,
    pub file: String,
    pub line: u32,
}

impl Source {
    /// Capture the caller's position.
    #[track_caller]
    pub fn caller() -> Source {
        let loc = std::panic::Location::caller();
        Source {
            function: None,
            file: loc.file().to_string(),
            line: loc.line(),
        }
    }
}

/// A key/value pair.
///
/// An empty key elides the attribute (though the children of an empty-keyed [group](Value::Group)
/// are still emitted, inline under its parent).
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Attr {
        Attr {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A named nesting level holding `attrs`.
    pub fn group(key: impl Into<String>, attrs: Vec<Attr>) -> Attr {
        Attr {
            key: key.into(),
            value: Value::Group(attrs),
        }
    }
}

/// An attribute value.
pub enum Value {
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    String(String),
    Duration(Duration),
    Time(DateTime<Utc>),
    /// An ordered sequence of attributes nested under this one's key.
    Group(Vec<Attr>),
    /// An opaque value; see [`AnyValue`].
    Any(AnyValue),
    /// A value computed on demand, resolved exactly once before kind dispatch.
    Lazy(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl Value {
    /// Defer computing a value until (and unless) a record containing it is actually emitted.
    pub fn lazy(f: impl Fn() -> Value + Send + Sync + 'static) -> Value {
        Value::Lazy(Arc::new(f))
    }

    /// The reflective fallback: capture any [`Serialize`] type as a JSON shadow of itself.
    ///
    /// A conversion failure is deferred into an [`AnyValue::Error`], surfacing when the record
    /// is encoded rather than at the call site.
    pub fn reflect<T: Serialize>(v: &T) -> Value {
        match serde_json::to_value(v) {
            Ok(j) => Value::Any(AnyValue::Reflect(j)),
            Err(err) => Value::Any(AnyValue::Error(Box::new(err))),
        }
    }

    /// Resolve a [lazy](Value::Lazy) value, passing everything else through by reference.
    pub(crate) fn resolve(&self) -> ResolvedValue<'_> {
        match self {
            Value::Lazy(f) => {
                let mut v = f();
                for _ in 0..MAX_LAZY_RESOLVES {
                    match v {
                        Value::Lazy(g) => v = g(),
                        _ => return ResolvedValue::Owned(v),
                    }
                }
                ResolvedValue::Owned(Value::Any(AnyValue::Error(BoxedError::from(
                    "lazy value resolved too many times",
                ))))
            }
            v => ResolvedValue::Borrowed(v),
        }
    }
}

/// Either a borrowed value or one produced by lazy resolution.
pub(crate) enum ResolvedValue<'a> {
    Borrowed(&'a Value),
    Owned(Value),
}

impl std::ops::Deref for ResolvedValue<'_> {
    type Target = Value;
    fn deref(&self) -> &Value {
        match self {
            ResolvedValue::Borrowed(v) => v,
            ResolvedValue::Owned(v) => v,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Uint64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Value {
        Value::Duration(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Value {
        Value::Time(v)
    }
}

impl From<AnyValue> for Value {
    fn from(v: AnyValue) -> Value {
        Value::Any(v)
    }
}

/// An opaque value, inspected by each encoder for the capability it carries.
///
/// The variants are ordered roughly by how specifically they describe the value; construction
/// picks exactly one, so there is no precedence question at encode time.
pub enum AnyValue {
    /// An error value; encoders emit its message.
    Error(BoxedError),
    /// A value with a fallible textual form.
    Text(Box<dyn MarshalText + Send + Sync>),
    /// A value with a fallible binary form; the journal encoder uses the length-prefixed frame,
    /// prose uses unpadded base64.
    Binary(Box<dyn MarshalBinary + Send + Sync>),
    /// A value that produces its own JSON, taken verbatim by the JSON encoder.
    Json(Box<dyn MarshalJson + Send + Sync>),
    /// A value rendered through its [`Display`](std::fmt::Display) impl.
    Display(Box<dyn std::fmt::Display + Send + Sync>),
    /// A value rendered through its [`Debug`](std::fmt::Debug) impl.
    Debug(Box<dyn std::fmt::Debug + Send + Sync>),
    /// A raw byte slice; journal uses the length-prefixed frame, prose renders hex.
    Bytes(Vec<u8>),
    /// A URL; prose wraps it in an OSC-8 hyperlink when styling is engaged.
    Url(String),
    /// The reflective fallback; see [`Value::reflect`].
    Reflect(serde_json::Value),
}

/// A fallible textual marshaler, in the manner of `encoding.TextMarshaler`.
pub trait MarshalText {
    fn marshal_text(&self) -> StdResult<String, BoxedError>;
}

/// A fallible binary marshaler.
pub trait MarshalBinary {
    fn marshal_binary(&self) -> StdResult<Vec<u8>, BoxedError>;
}

/// A fallible JSON marshaler. The returned bytes must be a complete, valid JSON value.
pub trait MarshalJson {
    fn marshal_json(&self) -> StdResult<Vec<u8>, BoxedError>;
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Int64(v) => write!(f, "Int64({})", v),
            Value::Uint64(v) => write!(f, "Uint64({})", v),
            Value::Float64(v) => write!(f, "Float64({})", v),
            Value::String(v) => write!(f, "String({:?})", v),
            Value::Duration(v) => write!(f, "Duration({:?})", v),
            Value::Time(v) => write!(f, "Time({})", v),
            Value::Group(v) => write!(f, "Group(len={})", v.len()),
            Value::Any(v) => write!(f, "Any({:?})", v),
            Value::Lazy(_) => write!(f, "Lazy(..)"),
        }
    }
}

impl std::fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AnyValue::Error(e) => write!(f, "Error({})", e),
            AnyValue::Text(_) => write!(f, "Text(..)"),
            AnyValue::Binary(_) => write!(f, "Binary(..)"),
            AnyValue::Json(_) => write!(f, "Json(..)"),
            AnyValue::Display(v) => write!(f, "Display({})", v),
            AnyValue::Debug(v) => write!(f, "Debug({:?})", v),
            AnyValue::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            AnyValue::Url(u) => write!(f, "Url({})", u),
            AnyValue::Reflect(v) => write!(f, "Reflect({})", v),
        }
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn lazy_resolves_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let v = Value::lazy(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Value::Int64(42)
        });
        match &*v.resolve() {
            Value::Int64(42) => {}
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_chains_are_bounded() {
        fn chain() -> Value {
            Value::lazy(chain)
        }
        match &*chain().resolve() {
            Value::Any(AnyValue::Error(_)) => {}
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[test]
    fn reflect_shadows_serde_types() {
        #[derive(Serialize)]
        struct Etc {
            a: &'static str,
            b: u32,
        }
        match Value::reflect(&Etc { a: "c", b: 4 }) {
            Value::Any(AnyValue::Reflect(j)) => {
                assert_eq!(j, serde_json::json!({"a": "c", "b": 4}));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }
}
