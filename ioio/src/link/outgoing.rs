//! Serialised writer with nested batching.
//!
//! Every command acquires the channel mutex for the duration of its byte
//! sequence, so commands from different threads interleave only at command
//! boundaries and a partial write can never leave the stream mid-command.
//!
//! A batch depth counter defers flushing: each command increments it on
//! entry and decrements on exit, flushing the transport only when the
//! depth returns to zero. Callers group commands by wrapping them in
//! `begin_batch`/`end_batch`, which keeps multi-command setups in a single
//! transport write instead of one packet per command.

use std::io::Write;

use ioio_protocol::{EncodeError, MAX_COMMAND_LEN};
use parking_lot::Mutex;

use crate::error::{Error, Result};

#[derive(Default)]
pub struct OutgoingChannel {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    writer: Option<Box<dyn Write + Send>>,
    depth: usize,
    dead: bool,
}

impl Inner {
    fn fail(&mut self, err: std::io::Error) -> Error {
        log::debug!("outgoing channel failed: {err}");
        self.dead = true;
        self.writer = None;
        Error::ConnectionLost
    }
}

impl OutgoingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, writer: Box<dyn Write + Send>) {
        let mut inner = self.inner.lock();
        inner.writer = Some(writer);
        inner.depth = 0;
        inner.dead = false;
    }

    /// Marks the channel dead; every later send fails with connection-lost.
    pub fn poison(&self) {
        let mut inner = self.inner.lock();
        inner.dead = true;
        inner.writer = None;
    }

    pub fn begin_batch(&self) {
        self.inner.lock().depth += 1;
    }

    pub fn end_batch(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.depth = inner.depth.saturating_sub(1);
        if inner.depth > 0 || inner.dead {
            return Ok(());
        }
        let flushed = match inner.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        };
        flushed.map_err(|err| inner.fail(err))
    }

    /// Writes one encoded command, flushing unless inside a batch.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.dead {
            return Err(Error::ConnectionLost);
        }
        if inner.writer.is_none() {
            return Err(Error::IllegalState("not connected".into()));
        }
        let flush = inner.depth == 0;
        let written = {
            let writer = inner.writer.as_mut().unwrap();
            writer
                .write_all(bytes)
                .and_then(|()| if flush { writer.flush() } else { Ok(()) })
        };
        written.map_err(|err| inner.fail(err))
    }

    /// Encodes one command into a scratch buffer and sends it. Encoding
    /// failures indicate an argument that slipped past validation.
    pub fn send_with(
        &self,
        encode: impl FnOnce(&mut [u8]) -> std::result::Result<usize, EncodeError>,
    ) -> Result<()> {
        let mut buf = [0u8; MAX_COMMAND_LEN];
        let len =
            encode(&mut buf).map_err(|err| Error::IllegalArgument(format!("encode: {err:?}")))?;
        self.send(&buf[..len])
    }

    /// Runs `f` with flushing deferred until it finishes. Send errors win
    /// over flush errors.
    pub fn batch<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.begin_batch();
        let result = f();
        let flushed = self.end_batch();
        result.and_then(|value| flushed.map(|()| value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        bytes: Arc<Mutex<Vec<u8>>>,
        flushes: Arc<AtomicUsize>,
    }

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn single_send_flushes() {
        let rec = Recorder::default();
        let channel = OutgoingChannel::new();
        channel.attach(Box::new(rec.clone()));
        channel.send(&[1, 2, 3]).unwrap();
        assert_eq!(&*rec.bytes.lock(), &[1, 2, 3]);
        assert_eq!(rec.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_flushes_once_at_outermost_end() {
        let rec = Recorder::default();
        let channel = OutgoingChannel::new();
        channel.attach(Box::new(rec.clone()));

        channel.begin_batch();
        channel.send(&[1]).unwrap();
        channel.begin_batch();
        channel.send(&[2]).unwrap();
        channel.end_batch().unwrap();
        channel.send(&[3]).unwrap();
        assert_eq!(rec.flushes.load(Ordering::SeqCst), 0);
        channel.end_batch().unwrap();

        assert_eq!(rec.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(&*rec.bytes.lock(), &[1, 2, 3]);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "down"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_poisons_the_channel() {
        let channel = OutgoingChannel::new();
        channel.attach(Box::new(Broken));
        assert_eq!(channel.send(&[0]), Err(Error::ConnectionLost));
        // Later sends fail without a writer present.
        assert_eq!(channel.send(&[0]), Err(Error::ConnectionLost));
    }
}
