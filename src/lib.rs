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

//! A contextual, structured logging sink
//! =====================================
//!
//! # Introduction
//!
//! [zlog](crate) is a [`Handler`] implementation focused on performant contextual logging: a
//! record formatter & transport layer that accepts records bearing a severity, an optional
//! source location, an optional timestamp, a message, and an ordered sequence of key/value
//! attributes (possibly nested into named groups), and emits them in one of three wire formats
//! — line-delimited JSON, the [native journald protocol], or a human-oriented "prose" format —
//! merging in contextual data (distributed-tracing baggage, profiler labels, a per-context
//! minimum level) carried on a request-scoped [`Context`]. A [`tracing_subscriber`] [`Layer`]
//! adapter connects it to the `tracing` macros.
//!
//! [native journald protocol]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
//!
//! ```rust
//! use zlog::{Attr, Context, Handler, Level, Options, Record};
//!
//! let h = Handler::stdout(Some(Options {
//!     omit_time: true,
//!     omit_source: true,
//!     ..Default::default()
//! }));
//! let h = h.with_attrs(vec![Attr::new("a", "b")]);
//! h.handle(
//!     &Context::new(),
//!     &Record::new(Level::INFO, "test").with_attrs(vec![Attr::new("c", "d")]),
//! )
//! .unwrap();
//!
//! // Emits: {"level":"INFO","msg":"test","a":"b","c":"d"}
//! ```
//!
//! # Journald
//!
//! On Linux systems, [`Handler::stderr`] will automatically upgrade to speaking the native
//! journald protocol using the heuristic outlined on systemd.io. For this process, some
//! information must be gathered via proc(5); exotic runtime configurations may not support
//! this. The values `wmem_default` and `wmem_max` are consulted to determine optimal settings
//! for the opened socket to journald and for when the memfd-based (see memfd_create(2) and
//! unix(7)) protocol must be used.
//!
//! # Prose output
//!
//! If [`Options::prose_format`] is set, output will be in prose rather than JSON. The field
//! order is not configurable. ANSI color codes and [terminal hyperlinks] will be used when
//! attached to a TTY and "[NO_COLOR]" is unset. Log records are separated by a ␞, fields are
//! separated by a ␟, and the attributes are separated from the message with a ␝. These [field
//! separators] may trip up incorrect programs.
//!
//! [terminal hyperlinks]: https://gist.github.com/egmontkob/eb114294efbcd5adb1944c9f3cb5feda
//! [NO_COLOR]: https://no-color.org/
//! [field separators]: https://en.wikipedia.org/wiki/C0_and_C1_control_codes#Field_separators
//!
//! # ZLOG_COLORS
//!
//! The `ZLOG_COLORS` environment variable is akin to "[LS_COLORS]". It is a colon-delimited
//! series of [SGR] parameters. Any characters outside of the range [0-;] will be ignored. The
//! controllable colors are, in order:
//!
//! [LS_COLORS]: https://www.gnu.org/software/coreutils/manual/coreutils.html#dircolors-invocation
//! [SGR]: https://en.wikipedia.org/wiki/ANSI_escape_code#SGR_(Select_Graphic_Rendition)_parameters
//!
//! - Error Level
//! - Warn Level
//! - Info Level
//! - Debug Level
//! - Source
//! - Timestamp
//! - Message
//! - Key
//! - string
//! - bool (true)
//! - bool (false)
//! - Number (int64/uint64/float64)
//! - Time
//! - Duration
//! - error
//! - Text marshaler
//! - Debug rendition
//! - Binary marshaler / byte slice
//! - JSON marshaler
//! - Reflective fallback
//!
//! All left-ward elements must be present, but may be empty. For example, to highlight only
//! errors:
//!
//! ```text
//! ZLOG_COLORS='::::::::::::::5'
//! export ZLOG_COLORS
//! ```
//!
//! See [`DEFAULT_PROSE_COLORS`] for the default colors.

mod buffer;
mod context;
mod detect;
mod error;
mod formatter;
mod handler;
mod json;
mod journal;
mod layer;
mod level;
mod prose;
mod record;
mod transport;

pub use context::Context;
pub use error::{Error, Result};
pub use handler::{Handler, Options};
pub use layer::Layer;
pub use level::Level;
pub use prose::DEFAULT_PROSE_COLORS;
pub use record::{
    AnyValue, Attr, MarshalBinary, MarshalJson, MarshalText, Record, Source, Value,
};
