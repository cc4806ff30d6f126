//! Connection lifecycle: handshake, version checks, sync, disconnect and
//! soft reset semantics.

mod common;

use std::thread;
use std::time::Duration;

use common::{connected, mock_pair};
use ioio::peripheral::DigitalOutputMode;
use ioio::{Error, Ioio, PullMode};

#[test]
fn handshake_reports_versions() {
    let (ioio, _board) = connected();
    let versions = ioio.versions().unwrap();
    assert_eq!(versions.hardware, "IOIO0003");
    assert_eq!(versions.bootloader, "IOIO0023");
    assert_eq!(versions.firmware, "IOIO0330");
}

#[test]
fn unknown_hardware_is_incompatible() {
    let (transport, mut board) = mock_pair();
    let ioio = Ioio::new(Box::new(transport));
    let announce = thread::spawn(move || {
        board.establish_as(b"ACME0001");
        board
    });
    let err = ioio.wait_for_connect().unwrap_err();
    assert!(matches!(err, Error::Incompatible(_)), "{err:?}");
    drop(announce.join().unwrap());

    // Incompatible is distinguishable from dead.
    let err = ioio
        .open_digital_output(0, DigitalOutputMode::Normal, false)
        .unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)), "{err:?}");
}

#[test]
fn rejected_interface_is_incompatible() {
    let (transport, mut board) = mock_pair();
    let ioio = Ioio::new(Box::new(transport));
    let answer = thread::spawn(move || {
        board.establish();
        let mut check = vec![0x02];
        check.extend_from_slice(b"IOIO0005");
        board.expect(&check);
        board.send(&[0x02, 0x00]);
        board
    });
    let err = ioio.wait_for_connect().unwrap_err();
    assert!(matches!(err, Error::Incompatible(_)), "{err:?}");
    drop(answer.join().unwrap());
}

#[test]
fn operations_require_a_connection() {
    let (transport, _board) = mock_pair();
    let ioio = Ioio::new(Box::new(transport));
    assert!(matches!(
        ioio.open_digital_input(1, PullMode::Floating),
        Err(Error::IllegalState(_))
    ));
    assert!(matches!(ioio.soft_reset(), Err(Error::IllegalState(_))));
}

#[test]
fn sync_returns_after_the_echo() {
    let (ioio, mut board) = connected();
    let led = ioio
        .open_digital_output(13, DigitalOutputMode::Normal, false)
        .unwrap();
    led.write(true).unwrap();

    let echo = thread::spawn(move || {
        board.expect(&[0x03, 0x34, 0x04, 0x35]);
        // Hold the echo back long enough to observe the barrier.
        thread::sleep(Duration::from_millis(50));
        board.expect(&[0x23]);
        board.send(&[0x23]);
        board
    });
    let before = std::time::Instant::now();
    ioio.sync().unwrap();
    assert!(before.elapsed() >= Duration::from_millis(40));
    drop(echo.join().unwrap());
}

#[test]
fn disconnect_releases_blocked_waiters() {
    let (ioio, mut board) = connected();
    let input = ioio.open_digital_input(5, PullMode::Floating).unwrap();
    board.expect(&[0x05, 5 << 2, 0x06, 5 << 2 | 1]);

    thread::scope(|scope| {
        let waiter = scope.spawn(|| input.wait_for_value(true));
        thread::sleep(Duration::from_millis(30));
        board.hang_up();
        assert_eq!(waiter.join().unwrap(), Err(Error::ConnectionLost));
    });

    ioio.wait_for_disconnect();
    assert!(matches!(
        ioio.open_digital_input(6, PullMode::Floating),
        Err(Error::ConnectionLost)
    ));
}

#[test]
fn host_disconnect_wakes_the_dispatcher() {
    let (ioio, _board) = connected();
    ioio.disconnect();
    ioio.wait_for_disconnect();
    assert!(matches!(ioio.sync(), Err(Error::ConnectionLost)));
}

#[test]
fn soft_reset_implicitly_closes_resources() {
    let (ioio, mut board) = connected();
    let led = ioio
        .open_digital_output(3, DigitalOutputMode::Normal, false)
        .unwrap();
    board.expect(&[0x03, 3 << 2]);

    board.send(&[0x01]);
    // The facade observes the implicit close once the event is dispatched.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        match led.write(true) {
            Err(Error::IllegalState(_)) => break,
            Ok(()) => {
                assert!(std::time::Instant::now() < deadline, "reset never observed");
                thread::sleep(Duration::from_millis(5));
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    // Closing a reset facade is a no-op on the wire and the pools.
    led.close().unwrap();

    // The descriptor is back in the pool and can be claimed again.
    let led = ioio
        .open_digital_output(3, DigitalOutputMode::Normal, true)
        .unwrap();
    drop(led);
    let _ = board;
}
