//! Test fixtures for spawnlite.
//!
//! The integration tests need a real helper process on the other side of the
//! supervisor's socketpair. These fixtures write small Python 3 scripts that
//! speak the wire protocol on fd 0 (`socket.socket(fileno=0)`,
//! `struct.pack(">H", ...)` framing, `socket.send_fds` for descriptor
//! passing), so the full fork/exec/restart path gets exercised end to end.

use std::path::{Path, PathBuf};
use std::time::Duration;

use spawnlite::SupervisorOptions;
use tempfile::TempDir;

/// Shared prelude of every fake helper: channel on fd 0 plus framing.
const PRELUDE: &str = r#"
import os
import socket
import struct
import sys
import time

chan = socket.socket(fileno=0)


def read_exact(n):
    buf = b""
    while len(buf) < n:
        chunk = chan.recv(n - len(buf))
        if not chunk:
            sys.exit(0)
        buf += chunk
    return buf


def read_message():
    header = chan.recv(2)
    if not header:
        sys.exit(0)
    if len(header) < 2:
        header += read_exact(2 - len(header))
    (size,) = struct.unpack(">H", header)
    return read_exact(size).decode("utf-8").split("\x00")[:-1]


def send_message(fields):
    payload = "".join(f + "\x00" for f in fields).encode("utf-8")
    chan.sendall(struct.pack(">H", len(payload)) + payload)


def send_worker(pid):
    listener = socket.socket(socket.AF_INET, socket.SOCK_STREAM)
    listener.bind(("127.0.0.1", 0))
    listener.listen(8)
    send_message([str(pid)])
    socket.send_fds(chan, [b"!"], [listener.fileno()])
    listener.close()
"#;

/// A scripted helper process written to a temp directory.
///
/// Keep the fixture alive for as long as the supervisor runs; dropping it
/// removes the script.
pub struct FakeHelper {
    script: PathBuf,
    _dir: TempDir,
}

impl FakeHelper {
    /// Helper that validates each request and answers with a fixed worker
    /// pid plus a live TCP listener descriptor.
    pub fn responding_with_pid(pid: u32) -> Self {
        Self::write(&format!(
            r#"
while True:
    fields = read_message()
    if len(fields) != 4 or fields[0] != "spawn_application":
        os._exit(4)
    send_worker({pid})
"#
        ))
    }

    /// Helper that answers with incrementing worker pids, crashes if it ever
    /// observes a second request queued before it responded (overlapping
    /// exchanges), and delays a little to give overlap a chance to show up.
    pub fn responding_serially(first_pid: u32) -> Self {
        Self::write(&format!(
            r#"
next_pid = {first_pid}
while True:
    fields = read_message()
    if len(fields) != 4 or fields[0] != "spawn_application":
        os._exit(4)
    try:
        if chan.recv(1, socket.MSG_PEEK | socket.MSG_DONTWAIT):
            os._exit(3)
    except BlockingIOError:
        pass
    time.sleep(0.01)
    send_worker(next_pid)
    next_pid += 1
"#
        ))
    }

    /// Helper that exits cleanly as soon as it starts.
    pub fn exiting_immediately() -> Self {
        Self::write("\nsys.exit(0)\n")
    }

    /// Helper that answers every request with a malformed pid field and no
    /// descriptor.
    pub fn responding_garbage() -> Self {
        Self::write(
            r#"
while True:
    fields = read_message()
    send_message(["not-a-pid"])
"#,
        )
    }

    fn write(body: &str) -> Self {
        let dir = TempDir::new().expect("cannot create temp dir for fake helper");
        let script = dir.path().join("fake_helper.py");
        std::fs::write(&script, format!("{PRELUDE}{body}"))
            .expect("cannot write fake helper script");
        Self { script, _dir: dir }
    }

    /// Path of the generated helper script.
    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// Supervisor options running this helper under `python3`.
    pub fn options(&self) -> SupervisorOptions {
        SupervisorOptions::new(&self.script)
    }
}

/// SIGKILL a process, as an external actor would.
///
/// The victim stays reapable by its parent (the supervisor under test), so
/// this deliberately does not wait on it; after the kernel tears the process
/// down its end of the channel reads as closed, which is what the supervisor
/// keys on. [`settle`] gives that teardown time to become observable.
pub fn kill_process(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

/// Grace period for an external process event (a kill, an exec failure) to
/// become observable on the channel.
pub fn settle() {
    std::thread::sleep(Duration::from_millis(100));
}
