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

//! Environment auto-detection
//! ==========================
//!
//! The two heuristics that drive default configuration: "are we in a Kubernetes pod" and "is
//! stderr connected to the journal". Both are consulted once and cached for the life of the
//! process.

use std::sync::OnceLock;

/// Report whether this process is (probably) being run inside a Kubernetes pod.
///
/// This relies on some default behavior which is trivially changed in a PodSpec.
pub(crate) fn in_k8s() -> bool {
    static CACHE: OnceLock<bool> = OnceLock::new();
    *CACHE.get_or_init(|| {
        std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
            || std::path::Path::new("/var/run/secrets/kubernetes.io").exists()
    })
}

/// Report whether the parent process has indicated that stderr is connected to a journald
/// stream.
///
/// Per the [journal protocol], `$JOURNAL_STREAM` carries `dev:ino` of the stream the journal
/// handed this process; it counts only if stderr still stats to the same file.
///
/// [journal protocol]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
pub(crate) fn journal_stream() -> bool {
    static CACHE: OnceLock<bool> = OnceLock::new();
    *CACHE.get_or_init(|| {
        let v = match std::env::var("JOURNAL_STREAM") {
            Ok(v) => v,
            Err(_) => return false,
        };
        let (dev, ino) = match v.split_once(':') {
            Some((d, i)) => match (d.parse::<u64>(), i.parse::<u64>()) {
                (Ok(d), Ok(i)) => (d, i),
                _ => return false,
            },
            None => return false,
        };
        stderr_matches(dev, ino)
    })
}

#[cfg(target_os = "linux")]
fn stderr_matches(dev: u64, ino: u64) -> bool {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(libc::STDERR_FILENO, &mut st) } != 0 {
        return false;
    }
    st.st_dev as u64 == dev && st.st_ino as u64 == ino
}

#[cfg(not(target_os = "linux"))]
fn stderr_matches(_dev: u64, _ino: u64) -> bool {
    false
}
