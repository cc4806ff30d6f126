//! In-memory transport and a scriptable board end for driving the session
//! without hardware.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use ioio::{Duplex, Ioio, Transport};
use parking_lot::{Condvar, Mutex};

struct PipeInner {
    buf: VecDeque<u8>,
    closed: bool,
}

#[derive(Clone)]
pub struct Pipe(Arc<(Mutex<PipeInner>, Condvar)>);

impl Pipe {
    fn new() -> Self {
        Self(Arc::new((
            Mutex::new(PipeInner {
                buf: VecDeque::new(),
                closed: false,
            }),
            Condvar::new(),
        )))
    }

    pub fn close(&self) {
        let (lock, cond) = &*self.0;
        lock.lock().closed = true;
        cond.notify_all();
    }
}

pub struct PipeReader(Pipe);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let (lock, cond) = &*self.0 .0;
        let mut inner = lock.lock();
        loop {
            if !inner.buf.is_empty() {
                let n = buf.len().min(inner.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.buf.pop_front().unwrap();
                }
                return Ok(n);
            }
            if inner.closed {
                return Ok(0);
            }
            cond.wait(&mut inner);
        }
    }
}

pub struct PipeWriter(Pipe);

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let (lock, cond) = &*self.0 .0;
        let mut inner = lock.lock();
        if inner.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            ));
        }
        inner.buf.extend(buf);
        cond.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn pipe() -> (PipeWriter, PipeReader, Pipe) {
    let shared = Pipe::new();
    (
        PipeWriter(shared.clone()),
        PipeReader(shared.clone()),
        shared,
    )
}

/// Transport over two in-memory pipes.
pub struct MockTransport {
    duplex: Option<Duplex>,
    host_to_board: Pipe,
    board_to_host: Pipe,
}

impl Transport for MockTransport {
    fn connect(&mut self) -> std::io::Result<Duplex> {
        Ok(self.duplex.take().expect("connect called twice"))
    }

    fn disconnect(&mut self) {
        self.host_to_board.close();
        self.board_to_host.close();
    }
}

/// The far end of the link, driven by the test.
pub struct BoardEnd {
    pub rx: PipeReader,
    pub tx: PipeWriter,
    host_to_board: Pipe,
    board_to_host: Pipe,
}

pub const HW_ID: &[u8; 8] = b"IOIO0003";
pub const BL_ID: &[u8; 8] = b"IOIO0023";
pub const FW_ID: &[u8; 8] = b"IOIO0330";

impl BoardEnd {
    pub fn send(&mut self, bytes: &[u8]) {
        self.tx.write_all(bytes).unwrap();
    }

    pub fn read_exact_n(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.rx.read_exact(&mut buf).unwrap();
        buf
    }

    pub fn expect(&mut self, bytes: &[u8]) {
        assert_eq!(self.read_exact_n(bytes.len()), bytes, "wire mismatch");
    }

    /// Announces the board with the default ids.
    pub fn establish(&mut self) {
        self.establish_as(HW_ID);
    }

    pub fn establish_as(&mut self, hardware: &[u8; 8]) {
        let mut frame = vec![0x00];
        frame.extend_from_slice(b"IOIO");
        frame.extend_from_slice(hardware);
        frame.extend_from_slice(BL_ID);
        frame.extend_from_slice(FW_ID);
        self.send(&frame);
    }

    /// Full handshake: establish, consume CHECK_INTERFACE, approve it.
    pub fn handshake(&mut self) {
        self.establish();
        let mut check = vec![0x02];
        check.extend_from_slice(b"IOIO0005");
        self.expect(&check);
        self.send(&[0x02, 0x01]);
    }

    /// Drops the link from the board side.
    pub fn hang_up(&mut self) {
        self.host_to_board.close();
        self.board_to_host.close();
    }
}

pub fn mock_pair() -> (MockTransport, BoardEnd) {
    let (host_writer, board_reader, host_to_board) = pipe();
    let (board_writer, host_reader, board_to_host) = pipe();
    (
        MockTransport {
            duplex: Some(Duplex {
                reader: Box::new(host_reader),
                writer: Box::new(host_writer),
            }),
            host_to_board: host_to_board.clone(),
            board_to_host: board_to_host.clone(),
        },
        BoardEnd {
            rx: board_reader,
            tx: board_writer,
            host_to_board,
            board_to_host,
        },
    )
}

/// A session connected to a fake board that has completed the handshake.
pub fn connected() -> (Ioio, BoardEnd) {
    let (transport, mut board) = mock_pair();
    let ioio = Ioio::new(Box::new(transport));
    let handshake = thread::spawn(move || {
        board.handshake();
        board
    });
    ioio.wait_for_connect().unwrap();
    (ioio, handshake.join().unwrap())
}
