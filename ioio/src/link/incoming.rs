//! The incoming dispatcher: one thread that owns the read side of the
//! transport, feeds the wire decoder and fans events out.
//!
//! EOF at an event boundary is an orderly disconnect; EOF mid-event, any
//! read error and any decode error are logged and then treated the same
//! way. In all cases the dispatcher poisons the outgoing channel, releases
//! every waiter with connection-lost and exits.

use std::io::{BufReader, ErrorKind, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ioio_protocol::{Event, EventDecoder, I2cReply};

use crate::link::{Notice, Update};
use crate::resource::{ResourceId, ResourceKind};
use crate::session::Core;

pub fn spawn(core: Arc<Core>, reader: Box<dyn Read + Send>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("ioio-incoming".into())
        .spawn(move || run(core, reader))
        .expect("failed to spawn the incoming dispatcher")
}

fn run(core: Arc<Core>, reader: Box<dyn Read + Send>) {
    let mut decoder = EventDecoder::new();
    let mut analog_frame: Vec<u8> = Vec::new();
    let mut reader = BufReader::new(reader);
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                if decoder.is_idle() {
                    log::debug!("stream closed");
                } else {
                    log::error!("stream closed mid-event");
                }
                break;
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                log::debug!("read failed: {err}");
                break;
            }
        }
        match decoder.push(byte[0]) {
            Ok(None) => {}
            Ok(Some(Event::SoftClose)) => {
                log::debug!("soft close received");
                break;
            }
            Ok(Some(event)) => handle(&core, &mut analog_frame, event),
            Err(err) => {
                log::error!("protocol error: {err:?}");
                break;
            }
        }
    }

    teardown(&core);
}

fn handle(core: &Core, analog_frame: &mut Vec<u8>, event: Event) {
    log::trace!("event {event:?}");
    match event {
        Event::EstablishConnection {
            hardware,
            bootloader,
            firmware,
        } => {
            if let Some(caps) = core.shared.establish(hardware, bootloader, firmware) {
                core.resources.configure(caps);
            }
        }
        Event::CheckInterfaceResponse { supported } => {
            core.shared.interface_response(supported);
        }
        Event::SoftReset => {
            // Descriptors go back to the pools before anyone is woken, so
            // a released waiter can immediately reopen its resource.
            core.resources.reset();
            analog_frame.clear();
            core.bus.broadcast(Notice::SoftReset);
            log::debug!("soft reset: all resources released");
        }
        Event::DigitalInStatus { pin, level } => {
            core.bus
                .dispatch(pin_key(pin), Update::DigitalIn(level));
        }
        Event::AnalogInFormat { pins } => {
            // The board reports only the new membership union; infer
            // per-pin open/close deltas, removals first.
            for &pin in analog_frame.iter() {
                if !pins.contains(&pin) {
                    core.bus.dispatch(pin_key(pin), Update::AnalogSampling(false));
                }
            }
            for &pin in pins.iter() {
                if !analog_frame.contains(&pin) {
                    core.bus.dispatch(pin_key(pin), Update::AnalogSampling(true));
                }
            }
            *analog_frame = pins.to_vec();
        }
        Event::AnalogInStatus { samples } => {
            for &(pin, value) in samples.iter() {
                core.bus.dispatch(pin_key(pin), Update::AnalogIn(value));
            }
        }
        Event::UartData { uart, data } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Uart, uart),
                Update::UartData(data.as_slice()),
            );
        }
        Event::UartTxStatus { uart, remaining } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Uart, uart),
                Update::TxStatus(remaining),
            );
        }
        Event::SpiData { spi, ss_pin, data } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Spi, spi),
                Update::SpiData {
                    ss_pin,
                    data: data.as_slice(),
                },
            );
        }
        Event::SpiTxStatus { spi, remaining } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Spi, spi),
                Update::TxStatus(remaining),
            );
        }
        Event::I2cResult { i2c, reply } => {
            let update = match &reply {
                I2cReply::Data(data) => Update::TwiReply(Some(data.as_slice())),
                I2cReply::Aborted => Update::TwiReply(None),
            };
            core.bus
                .dispatch(ResourceId::new(ResourceKind::Twi, i2c), update);
        }
        Event::I2cTxStatus { i2c, remaining } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Twi, i2c),
                Update::TxStatus(remaining),
            );
        }
        Event::IcspRxStatus { remaining } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Icsp, 0),
                Update::TxStatus(remaining),
            );
        }
        Event::IcspResult { visi } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Icsp, 0),
                Update::IcspResult(visi),
            );
        }
        Event::IncapReport { incap, value } => {
            // Single and double pools occupy disjoint module ids.
            if !core.bus.dispatch(
                ResourceId::new(ResourceKind::IncapSingle, incap),
                Update::Incap(value),
            ) {
                core.bus.dispatch(
                    ResourceId::new(ResourceKind::IncapDouble, incap),
                    Update::Incap(value),
                );
            }
        }
        Event::CapSenseReport { pin, value } => {
            core.bus.dispatch(pin_key(pin), Update::CapSense(value));
        }
        Event::SequencerEvent { kind, slots } => {
            core.bus.dispatch(
                ResourceId::new(ResourceKind::Sequencer, 0),
                Update::Sequencer { kind, slots },
            );
        }
        Event::Sync => core.bus.complete_sync(),
        // Status echoes and the reserved periodic-sampling report carry no
        // host-side state.
        Event::ChangeNotify { .. }
        | Event::UartStatus { .. }
        | Event::SpiStatus { .. }
        | Event::I2cStatus { .. }
        | Event::IcspConfig { .. }
        | Event::IncapStatus { .. }
        | Event::CapSenseSampling { .. }
        | Event::PeriodicDigitalInStatus => {}
        Event::SoftClose => unreachable!("handled by the read loop"),
    }
}

fn pin_key(pin: u8) -> ResourceId {
    ResourceId::new(ResourceKind::Pin, pin)
}

fn teardown(core: &Core) {
    core.outgoing.poison();
    core.bus.broadcast(Notice::Disconnected);
    core.bus.fail_syncs();
    core.shared.mark_dead();
    log::info!("session ended");
}
