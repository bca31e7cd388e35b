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

//! The record transport layer
//! ==========================
//!
//! # Introduction
//!
//! This module defines the [`Transport`] trait that carries completed records to their
//! destination, the mutex-serialized [`SyncWriter`] used for ordinary writers, and (on Linux)
//! the journald transport: a process-singleton Unix datagram socket that sends small records
//! as plain datagrams and large ones as sealed memory-file descriptors passed as ancillary
//! data.
//!
//! # Discussion
//!
//! Why not just use [`std::io::Write`] end to end? Because the semantics differ: a `Write`
//! implementation is free to accept a prefix of the bytes, while a record sink must deliver the
//! whole record in one framed unit or say it didn't. [`Transport::send`] is one call per
//! record; the count it returns exists so the handler can distinguish a short write from a
//! successful one.
//!
//! The journal socket's send-buffer limit is discovered once per process from
//! `/proc/sys/net/core/wmem_default` & `wmem_max`; records that cannot fit in a datagram are
//! written to a memfd, sealed with `SHRINK|GROW|WRITE|SEAL`, and the descriptor is passed over
//! the socket via `SCM_RIGHTS`. Setup failures on this path abort the process: the journal was
//! positively detected, so degrading silently to a broken sink would lose every record.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Operations a record sink must support: take one serialized record, deliver it whole.
pub(crate) trait Transport: Send + Sync {
    /// Send one serialized record, reporting how many bytes were delivered.
    fn send(&self, rec: &[u8]) -> std::io::Result<usize>;
}

/// Serializes access to an inner [`Write`] implementation.
///
/// The full record is assembled before this is called, so the single guarded `write` is the
/// whole critical section; record assembly never holds the lock.
pub(crate) struct SyncWriter<W> {
    inner: Mutex<W>,
}

impl<W> SyncWriter<W> {
    pub fn new(w: W) -> SyncWriter<W> {
        SyncWriter {
            inner: Mutex::new(w),
        }
    }
}

impl<W: Write + Send> Transport for SyncWriter<W> {
    fn send(&self, rec: &[u8]) -> std::io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(rec)
    }
}

#[cfg(target_os = "linux")]
pub(crate) use journal_impl::JournalTransport;

#[cfg(target_os = "linux")]
mod journal_impl {
    use super::Transport;

    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::os::unix::net::UnixDatagram;
    use std::sync::OnceLock;

    /// Where journald listens for the native protocol.
    const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

    /// The seals journald requires on a memfd before it will read it.
    const MEMFD_SEALS: libc::c_int =
        libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_WRITE | libc::F_SEAL_SEAL;

    struct JournalConn {
        sock: UnixDatagram,
        /// Largest record that will fit in a datagram; larger records take the memfd path.
        max_msg_size: u64,
    }

    static CONN: OnceLock<JournalConn> = OnceLock::new();

    /// The per-process socket to journald.
    ///
    /// Panics if the needed files in /proc are not accessible or if the setsockopt(2)-related
    /// calls fail; this runs only after the journal has been positively detected.
    fn conn() -> &'static JournalConn {
        CONN.get_or_init(|| {
            let def = read_proc_u64("/proc/sys/net/core/wmem_default");
            let max = read_proc_u64("/proc/sys/net/core/wmem_max");
            let mut max_msg_size = 4096;
            if let Some(def) = def {
                max_msg_size = def;
            }
            if let Some(max) = max {
                max_msg_size = max;
            }

            let sock = match UnixDatagram::unbound() {
                Ok(s) => s,
                Err(err) => panic!("zlog: journal setup: unable to open socket: {}", err),
            };
            if let Err(err) = sock.connect(JOURNAL_SOCKET) {
                panic!(
                    "zlog: journal setup: unable to connect {}: {}",
                    JOURNAL_SOCKET, err
                );
            }

            if let (Some(def), Some(max)) = (def, max) {
                if def != max {
                    let v = max.min(libc::c_int::MAX as u64) as libc::c_int;
                    let rc = unsafe {
                        libc::setsockopt(
                            sock.as_raw_fd(),
                            libc::SOL_SOCKET,
                            libc::SO_SNDBUF,
                            &v as *const libc::c_int as *const libc::c_void,
                            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                        )
                    };
                    if rc != 0 {
                        panic!(
                            "zlog: journal setup: setsockopt(SO_SNDBUF): {}",
                            io::Error::last_os_error()
                        );
                    }
                }
            }

            JournalConn { sock, max_msg_size }
        })
    }

    /// Read & parse one of the /proc sysctl files. An unreadable file is fatal; an unparsable
    /// one yields `None`.
    fn read_proc_u64(path: &str) -> Option<u64> {
        let s = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(err) => panic!("zlog: journal setup: reading {}: {}", path, err),
        };
        s.trim().parse::<u64>().ok()
    }

    /// Sends every record as a datagram, or writes it to a sealed memfd and passes the file
    /// descriptor, per the [native journal protocol].
    ///
    /// [native journal protocol]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
    pub(crate) struct JournalTransport;

    impl Transport for JournalTransport {
        fn send(&self, rec: &[u8]) -> io::Result<usize> {
            let c = conn();
            if rec.len() as u64 <= c.max_msg_size {
                return c.sock.send(rec);
            }
            let fd = memfd_record(rec)?;
            send_fd(&c.sock, fd.as_raw_fd())?;
            // The payload has been delivered, conceptually; the descriptor is closed when `fd`
            // drops.
            Ok(rec.len())
        }
    }

    /// Write `rec` into a fresh memfd and seal it.
    pub(super) fn memfd_record(rec: &[u8]) -> io::Result<OwnedFd> {
        let name = b"journal-message\0";
        let raw = unsafe { libc::memfd_create(name.as_ptr().cast(), libc::MFD_ALLOW_SEALING) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let mut rest = rec;
        while !rest.is_empty() {
            let n = unsafe { libc::write(fd.as_raw_fd(), rest.as_ptr().cast(), rest.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                    _ => return Err(err),
                }
            }
            rest = &rest[n as usize..];
        }
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_ADD_SEALS, MEMFD_SEALS) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(fd)
    }

    /// Send an empty datagram carrying `fd` as `SCM_RIGHTS` ancillary data.
    fn send_fd(sock: &UnixDatagram, fd: RawFd) -> io::Result<()> {
        // Room for one cmsghdr plus one fd, with headroom for the header's alignment.
        #[repr(C, align(8))]
        struct CmsgSpace {
            buf: [u8; 64],
        }
        let mut space = CmsgSpace { buf: [0; 64] };
        unsafe {
            let mut msg: libc::msghdr = std::mem::zeroed();
            msg.msg_control = space.buf.as_mut_ptr().cast();
            msg.msg_controllen =
                libc::CMSG_SPACE(std::mem::size_of::<RawFd>() as libc::c_uint) as _;
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(std::mem::size_of::<RawFd>() as libc::c_uint) as _;
            std::ptr::copy_nonoverlapping(
                &fd as *const RawFd as *const u8,
                libc::CMSG_DATA(cmsg),
                std::mem::size_of::<RawFd>(),
            );
            if libc::sendmsg(sock.as_raw_fd(), &msg, 0) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}
