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

//! Record severity levels
//! ======================
//!
//! # Introduction
//!
//! [`Level`] is a signed integer severity, with the conventional levels spaced four apart so that
//! intermediate severities ("a bit worse than a warning") can be expressed without a scheme
//! change. The syslog(3)-compatible levels keep the same four-count gap where they can:
//! `NOTICE` is `INFO + 2`, and `CRITICAL`, `ALERT` & `EMERGENCY` continue upward from `ERROR` in
//! increments of four.
//!
//! The display form follows the usual convention: the named level nearest from below, plus a
//! signed offset when the value falls between names (e.g. `INFO+2`, `DEBUG-4`).

type StdResult<T, E> = std::result::Result<T, E>;

/// A record's severity.
///
/// Larger is more severe. The named constants are spaced so that a filter set to, say,
/// [`Level::WARN`] admits everything from warnings on up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub i32);

impl Level {
    /// A nice low number to almost certainly catch anything emitted.
    pub const EVERYTHING: Level = Level(-100);

    pub const DEBUG: Level = Level(-4);
    pub const INFO: Level = Level(0);
    pub const WARN: Level = Level(4);
    pub const ERROR: Level = Level(8);

    /// syslog(3) "normal, but significant condition"
    pub const NOTICE: Level = Level(2);
    /// syslog(3) "critical conditions"
    pub const CRITICAL: Level = Level(12);
    /// syslog(3) "action must be taken immediately"
    pub const ALERT: Level = Level(16);
    /// syslog(3) "a panic condition"
    ///
    /// This crate does no special handling for Rust panics.
    pub const EMERGENCY: Level = Level(20);
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        let (name, delta) = match self.0 {
            l if l < Level::INFO.0 => ("DEBUG", l - Level::DEBUG.0),
            l if l < Level::WARN.0 => ("INFO", l - Level::INFO.0),
            l if l < Level::ERROR.0 => ("WARN", l - Level::WARN.0),
            l => ("ERROR", l - Level::ERROR.0),
        };
        if delta == 0 {
            write!(f, "{}", name)
        } else {
            write!(f, "{}{:+}", name, delta)
        }
    }
}

#[cfg(test)]
mod level_tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Level::DEBUG.to_string(), "DEBUG");
        assert_eq!(Level::INFO.to_string(), "INFO");
        assert_eq!(Level::NOTICE.to_string(), "INFO+2");
        assert_eq!(Level::WARN.to_string(), "WARN");
        assert_eq!(Level::ERROR.to_string(), "ERROR");
        assert_eq!(Level::CRITICAL.to_string(), "ERROR+4");
        assert_eq!(Level::ALERT.to_string(), "ERROR+8");
        assert_eq!(Level::EMERGENCY.to_string(), "ERROR+12");
        assert_eq!(Level(-8).to_string(), "DEBUG-4");
        assert_eq!(Level(1).to_string(), "INFO+1");
    }

    #[test]
    fn ordering() {
        assert!(Level::EVERYTHING < Level::DEBUG);
        assert!(Level::DEBUG < Level::INFO);
        assert!(Level::INFO < Level::NOTICE);
        assert!(Level::NOTICE < Level::WARN);
        assert!(Level::WARN < Level::ERROR);
        assert!(Level::ERROR < Level::CRITICAL);
        assert!(Level::CRITICAL < Level::ALERT);
        assert!(Level::ALERT < Level::EMERGENCY);
    }
}
