//! Duplex message channel between the supervisor and the helper process.
//!
//! One end of an `AF_UNIX` stream socketpair, carrying the framed string-list
//! messages defined in `spawnlite_shared::protocol` plus at most one passed
//! descriptor per exchange. The channel is strictly request/response: a
//! sender must read the response before issuing the next request, and there
//! is no buffering beyond the one in-flight message.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::socket::{
    AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags, SockFlag, SockType, UnixAddr,
    recv, recvmsg, send, sendmsg, socketpair,
};
use spawnlite_shared::errors::{SpawnliteError, SpawnliteResult};
use spawnlite_shared::protocol;

/// One endpoint of the supervisor/helper transport.
#[derive(Debug)]
pub struct MessageChannel {
    fd: Option<OwnedFd>,
}

impl MessageChannel {
    /// Wrap an already-connected socket endpoint.
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }

    /// Create a connected channel pair. One end is typically handed to a
    /// child process; tests use both ends in-process.
    pub fn pair() -> SpawnliteResult<(Self, Self)> {
        let (left, right) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::empty(),
        )
        .map_err(|e| SpawnliteError::Setup(format!("cannot create a Unix socket pair: {e}")))?;
        Ok((Self::from_fd(left), Self::from_fd(right)))
    }

    fn raw_fd(&self) -> SpawnliteResult<RawFd> {
        self.fd
            .as_ref()
            .map(|fd| fd.as_raw_fd())
            .ok_or_else(|| SpawnliteError::Transport("the channel is closed".into()))
    }

    /// Frame and write one message.
    ///
    /// `MSG_NOSIGNAL` keeps a dead peer from raising `SIGPIPE`; the failure
    /// surfaces as a `Transport` error instead.
    pub fn send(&self, fields: &[&str]) -> SpawnliteResult<()> {
        let fd = self.raw_fd()?;
        let frame = protocol::encode_message(fields)?;
        let mut written = 0;
        while written < frame.len() {
            match send(fd, &frame[written..], MsgFlags::MSG_NOSIGNAL) {
                Ok(n) => written += n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(SpawnliteError::Transport(format!(
                        "cannot write to the helper channel: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Blocking read of one message.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly before sending
    /// anything, so callers can tell "helper exited" apart from an I/O
    /// fault. A close in the middle of a frame is a `Transport` error.
    pub fn receive(&self) -> SpawnliteResult<Option<Vec<String>>> {
        let fd = self.raw_fd()?;

        let mut header = [0u8; protocol::HEADER_BYTES];
        let got = read_full(fd, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < header.len() {
            return Err(SpawnliteError::Transport(
                "the helper closed the channel inside a message header".into(),
            ));
        }

        let mut payload = vec![0u8; protocol::payload_len(header)];
        if read_full(fd, &mut payload)? < payload.len() {
            return Err(SpawnliteError::Transport(
                "the helper closed the channel inside a message payload".into(),
            ));
        }

        protocol::decode_fields(&payload).map(Some)
    }

    /// Retrieve the one descriptor the peer attached to its most recent
    /// message.
    ///
    /// The descriptor rides as `SCM_RIGHTS` ancillary data on a one-byte
    /// carrier payload; it is an error for the carrier to arrive bare.
    pub fn receive_fd(&self) -> SpawnliteResult<OwnedFd> {
        let fd = self.raw_fd()?;

        let mut buf = [0u8; 1];
        let mut iov = [IoSliceMut::new(&mut buf)];
        let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);

        let msg = recvmsg::<UnixAddr>(fd, &mut iov, Some(&mut cmsg_space), MsgFlags::empty())
            .map_err(|e| {
                SpawnliteError::Transport(format!(
                    "cannot receive a descriptor from the helper: {e}"
                ))
            })?;
        if msg.bytes == 0 {
            return Err(SpawnliteError::Transport(
                "the helper closed the channel before passing a descriptor".into(),
            ));
        }

        for cmsg in msg.cmsgs().into_iter().flatten() {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                if let Some(&received) = fds.first() {
                    return Ok(unsafe { OwnedFd::from_raw_fd(received) });
                }
            }
        }

        Err(SpawnliteError::Transport(
            "no descriptor was attached to the helper's response".into(),
        ))
    }

    /// Pass a descriptor to the peer on a one-byte carrier message.
    pub fn send_fd(&self, to_send: BorrowedFd<'_>) -> SpawnliteResult<()> {
        let fd = self.raw_fd()?;

        let carrier = [b'!'];
        let iov = [IoSlice::new(&carrier)];
        let raw = [to_send.as_raw_fd()];
        let cmsgs = [ControlMessage::ScmRights(&raw)];

        sendmsg::<UnixAddr>(fd, &iov, &cmsgs, MsgFlags::MSG_NOSIGNAL, None).map_err(|e| {
            SpawnliteError::Transport(format!("cannot pass a descriptor over the channel: {e}"))
        })?;
        Ok(())
    }

    /// True when the peer end is readable or hung up while no exchange is in
    /// flight. The protocol is strict request/response, so the read side is
    /// silent between exchanges; any readiness at idle means the helper is
    /// gone (EOF) or has broken protocol, and the channel must be discarded
    /// either way.
    pub fn peer_gone(&self) -> bool {
        let Some(fd) = self.fd.as_ref() else {
            return true;
        };
        let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(0) => false,
            Ok(_) => true,
            Err(_) => true,
        }
    }

    /// Release the local endpoint. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.fd = None;
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.fd.is_none()
    }
}

/// Read until `buf` is full, EOF, or an error. Returns the bytes read;
/// short counts mean the peer closed.
fn read_full(fd: RawFd, buf: &mut [u8]) -> SpawnliteResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match recv(fd, &mut buf[filled..], MsgFlags::empty()) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                return Err(SpawnliteError::Transport(format!(
                    "cannot read from the helper channel: {e}"
                )));
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn round_trip_preserves_fields_including_empty() {
        let (left, right) = MessageChannel::pair().unwrap();

        left.send(&["spawn_application", "/srv/app", "", ""]).unwrap();
        let fields = right.receive().unwrap().expect("message expected");
        assert_eq!(fields, vec!["spawn_application", "/srv/app", "", ""]);

        right.send(&["4242"]).unwrap();
        let fields = left.receive().unwrap().expect("message expected");
        assert_eq!(fields, vec!["4242"]);
    }

    #[test]
    fn clean_peer_close_reads_as_no_message() {
        let (left, right) = MessageChannel::pair().unwrap();
        drop(right);
        assert!(left.receive().unwrap().is_none());
    }

    #[test]
    fn send_to_dead_peer_is_a_transport_error_not_a_signal() {
        let (left, right) = MessageChannel::pair().unwrap();
        drop(right);
        // Without MSG_NOSIGNAL this would kill the test process with SIGPIPE
        let err = left.send(&["spawn_application"]).unwrap_err();
        assert!(matches!(err, SpawnliteError::Transport(_)));
    }

    #[test]
    fn eof_inside_a_frame_is_an_error() {
        let (left, right) = MessageChannel::pair().unwrap();
        // A header announcing 16 bytes, then close without a payload
        send(left.raw_fd().unwrap(), &[0u8, 16], MsgFlags::empty()).unwrap();
        drop(left);
        let err = right.receive().unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn descriptor_passing_moves_a_live_listener() {
        let (left, right) = MessageChannel::pair().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        left.send_fd(listener.as_fd()).unwrap();
        drop(listener);

        let received = right.receive_fd().unwrap();
        let received = TcpListener::from(received);
        assert_eq!(received.local_addr().unwrap(), addr);

        // The passed descriptor still accepts connections
        let client = TcpStream::connect(addr).unwrap();
        let (_conn, peer) = received.accept().unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
    }

    #[test]
    fn missing_descriptor_is_an_error() {
        let (left, right) = MessageChannel::pair().unwrap();
        // A bare carrier byte with no ancillary payload
        send(left.raw_fd().unwrap(), b"!", MsgFlags::empty()).unwrap();
        let err = right.receive_fd().unwrap_err();
        assert!(err.to_string().contains("no descriptor"));
    }

    #[test]
    fn close_is_idempotent_and_poisons_the_endpoint() {
        let (mut left, _right) = MessageChannel::pair().unwrap();
        left.close();
        left.close();
        assert!(left.is_closed());
        assert!(left.send(&["x"]).is_err());
        assert!(left.peer_gone());
    }

    #[test]
    fn peer_gone_tracks_the_remote_end() {
        let (left, right) = MessageChannel::pair().unwrap();
        assert!(!left.peer_gone());
        drop(right);
        assert!(left.peer_gone());
    }
}
