use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Mutex;

/// A one-shot wake-up channel, selectable alongside a socket, used to cancel
/// a blocking `poll`/`recv`. See spec §4.3.
///
/// POSIX-only: an anonymous pipe with both ends non-blocking. The Windows
/// loopback-TCP-pair variant mentioned in spec §4.3 is not implemented here
/// (this crate targets Linux); see DESIGN.md.
pub struct EventPipe {
    read_fd: OwnedFd,
    write_fd: OwnedFd,
    guard: Mutex<()>,
}

impl EventPipe {
    pub fn new() -> io::Result<Self> {
        let (read_fd, write_fd) = rustix::pipe::pipe_with(
            rustix::pipe::PipeFlags::NONBLOCK | rustix::pipe::PipeFlags::CLOEXEC,
        )?;
        Ok(EventPipe { read_fd, write_fd, guard: Mutex::new(()) })
    }

    /// Writes a single byte. Concurrent signals coalesce: once the pipe is
    /// non-empty, further writes are redundant wake-ups.
    pub fn signal(&self) {
        let _guard = self.guard.lock().unwrap();
        match rustix::io::write(&self.write_fd, b"0") {
            Ok(_) => {}
            Err(rustix::io::Errno::AGAIN) => {} // already signalled, pipe full enough
            Err(err) => tracing::warn!("failed to write to event pipe: {err}"),
        }
    }

    /// Reads until `EWOULDBLOCK`, discarding all bytes.
    pub fn drain(&self) {
        let _guard = self.guard.lock().unwrap();
        let mut buf = [0u8; 64];
        loop {
            match rustix::io::read(&self.read_fd, &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(rustix::io::Errno::AGAIN) => break,
                Err(err) => {
                    tracing::warn!("failed to drain event pipe: {err}");
                    break;
                }
            }
        }
    }

    pub fn read_fd(&self) -> BorrowedFd<'_> {
        self.read_fd.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::event::{poll, PollFd, PollFlags};

    #[test]
    fn signal_then_poll_observes_readiness() {
        let pipe = EventPipe::new().unwrap();
        let read_fd = pipe.read_fd();
        let mut fds = [PollFd::new(&read_fd, PollFlags::IN)];
        assert_eq!(poll(&mut fds, 0).unwrap(), 0);

        pipe.signal();
        let mut fds = [PollFd::new(&read_fd, PollFlags::IN)];
        assert_eq!(poll(&mut fds, 100).unwrap(), 1);

        pipe.drain();
        let mut fds = [PollFd::new(&read_fd, PollFlags::IN)];
        assert_eq!(poll(&mut fds, 0).unwrap(), 0);
    }

    #[test]
    fn concurrent_signals_coalesce() {
        let pipe = EventPipe::new().unwrap();
        pipe.signal();
        pipe.signal();
        pipe.signal();
        pipe.drain();

        let read_fd = pipe.read_fd();
        let mut fds = [PollFd::new(&read_fd, PollFlags::IN)];
        assert_eq!(poll(&mut fds, 0).unwrap(), 0);
    }
}
