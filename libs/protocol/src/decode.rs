//! Incremental decoder for board-to-host events.
//!
//! Events arrive as an opcode byte followed by an opcode-specific payload.
//! [`EventDecoder::push`] consumes one byte at a time and yields a complete
//! [`Event`] once the payload is assembled, so the caller can feed it from
//! any chunking of the underlying stream.
//!
//! Two events make the decoder stateful: REPORT_ANALOG_IN_FORMAT announces
//! the list of analog pins that subsequent REPORT_ANALOG_IN_STATUS frames
//! cover, and the byte count of a status frame is derived from that list.
//! An incoming SOFT_RESET clears the list.

use heapless::Vec;

use crate::MAGIC;

pub const EVT_ESTABLISH_CONNECTION: u8 = 0x00;
pub const EVT_SOFT_RESET: u8 = 0x01;
pub const EVT_CHECK_INTERFACE_RESPONSE: u8 = 0x02;
pub const EVT_REPORT_DIGITAL_IN_STATUS: u8 = 0x04;
/// Reserved by the firmware; decoded as an empty event and ignored.
pub const EVT_REPORT_PERIODIC_DIGITAL_IN_STATUS: u8 = 0x05;
pub const EVT_SET_CHANGE_NOTIFY: u8 = 0x06;
pub const EVT_REPORT_ANALOG_IN_STATUS: u8 = 0x0B;
pub const EVT_REPORT_ANALOG_IN_FORMAT: u8 = 0x0C;
pub const EVT_UART_STATUS: u8 = 0x0D;
pub const EVT_UART_DATA: u8 = 0x0E;
pub const EVT_UART_REPORT_TX_STATUS: u8 = 0x0F;
pub const EVT_SPI_STATUS: u8 = 0x10;
pub const EVT_SPI_DATA: u8 = 0x11;
pub const EVT_SPI_REPORT_TX_STATUS: u8 = 0x12;
pub const EVT_I2C_STATUS: u8 = 0x13;
pub const EVT_I2C_RESULT: u8 = 0x14;
pub const EVT_I2C_REPORT_TX_STATUS: u8 = 0x15;
pub const EVT_ICSP_REPORT_RX_STATUS: u8 = 0x16;
pub const EVT_ICSP_RESULT: u8 = 0x17;
pub const EVT_ICSP_CONFIG: u8 = 0x1A;
pub const EVT_INCAP_STATUS: u8 = 0x1B;
pub const EVT_INCAP_REPORT: u8 = 0x1C;
pub const EVT_SOFT_CLOSE: u8 = 0x1D;
pub const EVT_CAPSENSE_REPORT: u8 = 0x1E;
pub const EVT_SET_CAPSENSE_SAMPLING: u8 = 0x1F;
pub const EVT_SEQUENCER_EVENT: u8 = 0x20;
pub const EVT_SYNC: u8 = 0x23;

/// Most pins an analog frame can cover (pin fields are 6 bits wide).
pub const MAX_ANALOG_FRAME: usize = 64;

/// Largest assembled payload (an analog status frame over a full list).
const MAX_EVENT_PAYLOAD: usize = MAX_ANALOG_FRAME + MAX_ANALOG_FRAME / 4;

const SEQ_EVENT_OPENED: u8 = 2;
const SEQ_EVENT_STOPPED: u8 = 4;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The opcode has no device-to-host decoding.
    UnknownOpcode(u8),
    /// ESTABLISH_CONNECTION did not start with `IOIO`.
    BadMagic([u8; 4]),
    /// A length field exceeds what the protocol allows.
    Overflow,
    /// A field carries a value outside its defined range.
    InvalidValue(u8),
}

/// Outcome of an I2C transaction, with the firmware's 0xFF length sentinel
/// surfaced as its own variant.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cReply {
    Data(Vec<u8, 64>),
    /// The slave did not acknowledge; no data was transferred.
    Aborted,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SequencerEventKind {
    Paused = 0,
    Stalled = 1,
    Opened = 2,
    NextCue = 3,
    Stopped = 4,
    Closed = 5,
}

impl TryFrom<u8> for SequencerEventKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        Ok(match value {
            0 => Self::Paused,
            1 => Self::Stalled,
            2 => Self::Opened,
            3 => Self::NextCue,
            4 => Self::Stopped,
            5 => Self::Closed,
            other => return Err(DecodeError::InvalidValue(other)),
        })
    }
}

/// A fully decoded board-to-host event.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    EstablishConnection {
        hardware: [u8; 8],
        bootloader: [u8; 8],
        firmware: [u8; 8],
    },
    SoftReset,
    CheckInterfaceResponse {
        supported: bool,
    },
    DigitalInStatus {
        pin: u8,
        level: bool,
    },
    /// Reserved event, carried for byte-count fidelity only.
    PeriodicDigitalInStatus,
    ChangeNotify {
        pin: u8,
        enabled: bool,
    },
    /// The new set of sampled analog pins, in frame order.
    AnalogInFormat {
        pins: Vec<u8, MAX_ANALOG_FRAME>,
    },
    /// One 10-bit sample per currently sampled pin, in frame order.
    AnalogInStatus {
        samples: Vec<(u8, u16), MAX_ANALOG_FRAME>,
    },
    UartStatus {
        uart: u8,
        open: bool,
    },
    UartData {
        uart: u8,
        data: Vec<u8, 64>,
    },
    UartTxStatus {
        uart: u8,
        remaining: u16,
    },
    SpiStatus {
        spi: u8,
        open: bool,
    },
    SpiData {
        spi: u8,
        ss_pin: u8,
        data: Vec<u8, 64>,
    },
    SpiTxStatus {
        spi: u8,
        remaining: u16,
    },
    I2cStatus {
        i2c: u8,
        open: bool,
    },
    I2cResult {
        i2c: u8,
        reply: I2cReply,
    },
    I2cTxStatus {
        i2c: u8,
        remaining: u16,
    },
    IcspRxStatus {
        remaining: u16,
    },
    IcspResult {
        visi: u16,
    },
    IcspConfig {
        open: bool,
    },
    IncapStatus {
        incap: u8,
        open: bool,
    },
    IncapReport {
        incap: u8,
        value: u32,
    },
    SoftClose,
    CapSenseReport {
        pin: u8,
        value: u16,
    },
    CapSenseSampling {
        pin: u8,
        enabled: bool,
    },
    SequencerEvent {
        kind: SequencerEventKind,
        /// Cue slots available; meaningful for `Opened` and `Stopped` only.
        slots: u8,
    },
    Sync,
}

struct Pending {
    opcode: u8,
    buf: Vec<u8, MAX_EVENT_PAYLOAD>,
}

/// Push-based event decoder. Feed it the raw incoming byte stream.
pub struct EventDecoder {
    pending: Option<Pending>,
    analog_pins: Vec<u8, MAX_ANALOG_FRAME>,
}

impl EventDecoder {
    pub const fn new() -> Self {
        Self {
            pending: None,
            analog_pins: Vec::new(),
        }
    }

    /// True when the decoder sits at an event boundary. EOF here is an
    /// orderly disconnect; EOF mid-event is a stream corruption.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Pins covered by analog status frames, in frame order.
    pub fn analog_frame_pins(&self) -> &[u8] {
        &self.analog_pins
    }

    pub fn push(&mut self, byte: u8) -> Result<Option<Event>, DecodeError> {
        match &mut self.pending {
            None => {
                let total = payload_len(byte, &[], self.analog_pins.len())?;
                if total == 0 {
                    return self.finish(byte, &[]).map(Some);
                }
                self.pending = Some(Pending {
                    opcode: byte,
                    buf: Vec::new(),
                });
                Ok(None)
            }
            Some(pending) => {
                pending.buf.push(byte).map_err(|_| DecodeError::Overflow)?;
                let total = payload_len(pending.opcode, &pending.buf, self.analog_pins.len())?;
                if pending.buf.len() < total {
                    return Ok(None);
                }
                let Pending { opcode, buf } = self.pending.take().unwrap();
                self.finish(opcode, &buf).map(Some)
            }
        }
    }

    fn finish(&mut self, opcode: u8, buf: &[u8]) -> Result<Event, DecodeError> {
        Ok(match opcode {
            EVT_ESTABLISH_CONNECTION => {
                if buf[..4] != MAGIC {
                    return Err(DecodeError::BadMagic([buf[0], buf[1], buf[2], buf[3]]));
                }
                let mut hardware = [0u8; 8];
                let mut bootloader = [0u8; 8];
                let mut firmware = [0u8; 8];
                hardware.copy_from_slice(&buf[4..12]);
                bootloader.copy_from_slice(&buf[12..20]);
                firmware.copy_from_slice(&buf[20..28]);
                Event::EstablishConnection {
                    hardware,
                    bootloader,
                    firmware,
                }
            }
            EVT_SOFT_RESET => {
                self.analog_pins.clear();
                Event::SoftReset
            }
            EVT_CHECK_INTERFACE_RESPONSE => Event::CheckInterfaceResponse {
                supported: buf[0] & 1 != 0,
            },
            EVT_REPORT_DIGITAL_IN_STATUS => Event::DigitalInStatus {
                pin: buf[0] >> 2,
                level: buf[0] & 1 != 0,
            },
            EVT_REPORT_PERIODIC_DIGITAL_IN_STATUS => Event::PeriodicDigitalInStatus,
            EVT_SET_CHANGE_NOTIFY => Event::ChangeNotify {
                pin: buf[0] >> 2,
                enabled: buf[0] & 1 != 0,
            },
            EVT_REPORT_ANALOG_IN_FORMAT => {
                let mut pins = Vec::new();
                pins.extend_from_slice(&buf[1..]).map_err(|_| DecodeError::Overflow)?;
                self.analog_pins = pins.clone();
                Event::AnalogInFormat { pins }
            }
            EVT_REPORT_ANALOG_IN_STATUS => {
                // Each pin carries its high 8 bits in a dedicated byte; the
                // 2 low bits of up to 4 pins share a header byte.
                let mut samples = Vec::new();
                for (i, &pin) in self.analog_pins.iter().enumerate() {
                    let group = i / 4;
                    let slot = i % 4;
                    let header = buf[group * 5];
                    let high = buf[group * 5 + 1 + slot];
                    let value = u16::from(high) << 2 | u16::from(header >> (2 * slot) & 3);
                    samples.push((pin, value)).map_err(|_| DecodeError::Overflow)?;
                }
                Event::AnalogInStatus { samples }
            }
            EVT_UART_STATUS => Event::UartStatus {
                uart: buf[0] & 3,
                open: buf[0] & 0x80 != 0,
            },
            EVT_UART_DATA => {
                let mut data = Vec::new();
                data.extend_from_slice(&buf[1..]).map_err(|_| DecodeError::Overflow)?;
                Event::UartData {
                    uart: buf[0] >> 6,
                    data,
                }
            }
            EVT_UART_REPORT_TX_STATUS => Event::UartTxStatus {
                uart: buf[0] & 3,
                remaining: tx_remaining(buf),
            },
            EVT_SPI_STATUS => Event::SpiStatus {
                spi: buf[0] & 3,
                open: buf[0] & 0x80 != 0,
            },
            EVT_SPI_DATA => {
                let mut data = Vec::new();
                data.extend_from_slice(&buf[2..]).map_err(|_| DecodeError::Overflow)?;
                Event::SpiData {
                    spi: buf[0] >> 6,
                    ss_pin: buf[1] & 0x3F,
                    data,
                }
            }
            EVT_SPI_REPORT_TX_STATUS => Event::SpiTxStatus {
                spi: buf[0] & 3,
                remaining: tx_remaining(buf),
            },
            EVT_I2C_STATUS => Event::I2cStatus {
                i2c: buf[0] & 3,
                open: buf[0] & 0x80 != 0,
            },
            EVT_I2C_RESULT => {
                let reply = if buf[1] == 0xFF {
                    I2cReply::Aborted
                } else {
                    let mut data = Vec::new();
                    data.extend_from_slice(&buf[2..]).map_err(|_| DecodeError::Overflow)?;
                    I2cReply::Data(data)
                };
                Event::I2cResult {
                    i2c: buf[0] & 3,
                    reply,
                }
            }
            EVT_I2C_REPORT_TX_STATUS => Event::I2cTxStatus {
                i2c: buf[0] & 3,
                remaining: tx_remaining(buf),
            },
            EVT_ICSP_REPORT_RX_STATUS => Event::IcspRxStatus {
                remaining: tx_remaining(buf),
            },
            EVT_ICSP_RESULT => Event::IcspResult {
                visi: u16::from_le_bytes([buf[0], buf[1]]),
            },
            EVT_ICSP_CONFIG => Event::IcspConfig {
                open: buf[0] & 1 != 0,
            },
            EVT_INCAP_STATUS => Event::IncapStatus {
                incap: buf[0] & 0x0F,
                open: buf[0] & 0x80 != 0,
            },
            EVT_INCAP_REPORT => {
                let mut raw = [0u8; 4];
                raw[..buf.len() - 1].copy_from_slice(&buf[1..]);
                Event::IncapReport {
                    incap: buf[0] & 0x3F,
                    value: u32::from_le_bytes(raw),
                }
            }
            EVT_SOFT_CLOSE => Event::SoftClose,
            EVT_CAPSENSE_REPORT => Event::CapSenseReport {
                pin: buf[0] & 0x3F,
                value: u16::from(buf[0] >> 6) | u16::from(buf[1]) << 2,
            },
            EVT_SET_CAPSENSE_SAMPLING => Event::CapSenseSampling {
                pin: buf[0] & 0x3F,
                enabled: buf[0] & 0x80 != 0,
            },
            EVT_SEQUENCER_EVENT => Event::SequencerEvent {
                kind: SequencerEventKind::try_from(buf[0])?,
                slots: buf.get(1).copied().unwrap_or(0),
            },
            EVT_SYNC => Event::Sync,
            other => return Err(DecodeError::UnknownOpcode(other)),
        })
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 10-bit "bytes remaining in the firmware TX buffer" shared by the
/// UART/SPI/I2C/ICSP status reports.
fn tx_remaining(buf: &[u8]) -> u16 {
    u16::from(buf[0] >> 2) | u16::from(buf[1]) << 6
}

/// Total payload length for `opcode` given the bytes seen so far. For
/// variable-length events the result grows once the length field is in.
fn payload_len(opcode: u8, buf: &[u8], analog_n: usize) -> Result<usize, DecodeError> {
    Ok(match opcode {
        EVT_ESTABLISH_CONNECTION => 28,
        EVT_SOFT_RESET | EVT_SOFT_CLOSE | EVT_SYNC | EVT_REPORT_PERIODIC_DIGITAL_IN_STATUS => 0,
        EVT_CHECK_INTERFACE_RESPONSE
        | EVT_REPORT_DIGITAL_IN_STATUS
        | EVT_SET_CHANGE_NOTIFY
        | EVT_UART_STATUS
        | EVT_SPI_STATUS
        | EVT_I2C_STATUS
        | EVT_ICSP_CONFIG
        | EVT_INCAP_STATUS
        | EVT_SET_CAPSENSE_SAMPLING => 1,
        EVT_UART_REPORT_TX_STATUS
        | EVT_SPI_REPORT_TX_STATUS
        | EVT_I2C_REPORT_TX_STATUS
        | EVT_ICSP_REPORT_RX_STATUS
        | EVT_ICSP_RESULT
        | EVT_CAPSENSE_REPORT => 2,
        EVT_REPORT_ANALOG_IN_STATUS => analog_n + analog_n.div_ceil(4),
        EVT_REPORT_ANALOG_IN_FORMAT => {
            if buf.is_empty() {
                1
            } else {
                1 + buf[0] as usize
            }
        }
        EVT_UART_DATA => {
            if buf.is_empty() {
                1
            } else {
                2 + (buf[0] & 0x3F) as usize
            }
        }
        EVT_SPI_DATA => {
            if buf.len() < 2 {
                2
            } else {
                3 + (buf[0] & 0x3F) as usize
            }
        }
        EVT_I2C_RESULT => {
            if buf.len() < 2 {
                2
            } else if buf[1] == 0xFF {
                2
            } else {
                2 + buf[1] as usize
            }
        }
        EVT_INCAP_REPORT => {
            if buf.is_empty() {
                1
            } else {
                let size = (buf[0] >> 6) as usize;
                1 + if size == 0 { 4 } else { size }
            }
        }
        EVT_SEQUENCER_EVENT => {
            if buf.is_empty() {
                1
            } else {
                1 + usize::from(buf[0] == SEQ_EVENT_OPENED || buf[0] == SEQ_EVENT_STOPPED)
            }
        }
        other => return Err(DecodeError::UnknownOpcode(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut EventDecoder, bytes: &[u8]) -> heapless::Vec<Event, 8> {
        let mut events = heapless::Vec::new();
        for &b in bytes {
            if let Some(event) = decoder.push(b).unwrap() {
                events.push(event).unwrap();
            }
        }
        events
    }

    #[test]
    fn establish_connection_frame() {
        let mut bytes = heapless::Vec::<u8, 32>::new();
        bytes.push(0x00).unwrap();
        bytes.extend_from_slice(b"IOIO").unwrap();
        bytes.extend_from_slice(b"IOIO0003").unwrap();
        bytes.extend_from_slice(b"IOIO0023").unwrap();
        bytes.extend_from_slice(b"IOIO0330").unwrap();

        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &bytes);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::EstablishConnection {
                hardware,
                bootloader,
                firmware,
            } => {
                assert_eq!(hardware, b"IOIO0003");
                assert_eq!(bootloader, b"IOIO0023");
                assert_eq!(firmware, b"IOIO0330");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(decoder.is_idle());
    }

    #[test]
    fn establish_connection_bad_magic() {
        let mut decoder = EventDecoder::new();
        let mut err = None;
        for &b in b"\x00OIOI........................".iter() {
            match decoder.push(b) {
                Ok(_) => {}
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
        assert_eq!(err, Some(DecodeError::BadMagic(*b"OIOI")));
    }

    #[test]
    fn digital_in_status_unpacks_pin_and_level() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x04, 5 << 2 | 1]);
        assert_eq!(events[0], Event::DigitalInStatus { pin: 5, level: true });
    }

    #[test]
    fn analog_format_then_status() {
        let mut decoder = EventDecoder::new();
        // Format: pins 31 and 32.
        let events = feed(&mut decoder, &[0x0C, 2, 31, 32]);
        assert_eq!(events.len(), 1);
        assert_eq!(decoder.analog_frame_pins(), &[31, 32]);

        // Status: header carries the 2 low bits of each pin.
        // pin 31 -> (0x80 << 2) | 0b01, pin 32 -> (0x01 << 2) | 0b10.
        let events = feed(&mut decoder, &[0x0B, 0b1001, 0x80, 0x01]);
        match &events[0] {
            Event::AnalogInStatus { samples } => {
                assert_eq!(samples.as_slice(), &[(31, 0x201), (32, 0x006)]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn analog_status_rereads_header_every_four_pins() {
        let mut decoder = EventDecoder::new();
        feed(&mut decoder, &[0x0C, 5, 31, 32, 33, 34, 35]);
        // 5 pins -> 2 header bytes + 5 sample bytes.
        let frame = [0x0B, 0b11_10_01_00, 1, 2, 3, 4, 0b01, 5];
        let events = feed(&mut decoder, &frame);
        match &events[0] {
            Event::AnalogInStatus { samples } => {
                assert_eq!(
                    samples.as_slice(),
                    &[(31, 4), (32, 9), (33, 14), (34, 19), (35, 21)]
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn empty_format_clears_the_frame_list() {
        let mut decoder = EventDecoder::new();
        feed(&mut decoder, &[0x0C, 1, 31]);
        let events = feed(&mut decoder, &[0x0C, 0]);
        assert_eq!(
            events[0],
            Event::AnalogInFormat {
                pins: heapless::Vec::new()
            }
        );
        assert!(decoder.analog_frame_pins().is_empty());
    }

    #[test]
    fn soft_reset_clears_analog_state() {
        let mut decoder = EventDecoder::new();
        feed(&mut decoder, &[0x0C, 1, 31]);
        let events = feed(&mut decoder, &[0x01]);
        assert_eq!(events[0], Event::SoftReset);
        assert!(decoder.analog_frame_pins().is_empty());
    }

    #[test]
    fn uart_data_length_field() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x0E, 1 << 6 | 2, 0xDE, 0xAD, 0xBE]);
        match &events[0] {
            Event::UartData { uart, data } => {
                assert_eq!(*uart, 1);
                assert_eq!(data.as_slice(), &[0xDE, 0xAD, 0xBE]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn tx_status_ten_bit_count() {
        let mut decoder = EventDecoder::new();
        // remaining = (a1 >> 2) | (a2 << 6) with uart in the low 2 bits.
        let events = feed(&mut decoder, &[0x0F, 0b0000_1010 | 2, 0x03]);
        assert_eq!(
            events[0],
            Event::UartTxStatus {
                uart: 2,
                remaining: 2 | 3 << 6
            }
        );
    }

    #[test]
    fn spi_data_frame() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x11, 0x03, 0x40, 0xAA, 0xBB, 0xCC, 0x00]);
        match &events[0] {
            Event::SpiData { spi, ss_pin, data } => {
                assert_eq!(*spi, 0);
                assert_eq!(*ss_pin, 0);
                assert_eq!(data.as_slice(), &[0xAA, 0xBB, 0xCC, 0x00]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn i2c_result_data_and_aborted() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x14, 0x01, 2, 0x10, 0x20]);
        match &events[0] {
            Event::I2cResult { i2c, reply } => {
                assert_eq!(*i2c, 1);
                assert_eq!(
                    *reply,
                    I2cReply::Data(heapless::Vec::from_slice(&[0x10, 0x20]).unwrap())
                );
            }
            other => panic!("unexpected event {other:?}"),
        }

        let events = feed(&mut decoder, &[0x14, 0x00, 0xFF]);
        assert_eq!(
            events[0],
            Event::I2cResult {
                i2c: 0,
                reply: I2cReply::Aborted
            }
        );
    }

    #[test]
    fn incap_report_size_zero_means_four_bytes() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x1C, 3, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(
            events[0],
            Event::IncapReport {
                incap: 3,
                value: 0x1234_5678
            }
        );

        let events = feed(&mut decoder, &[0x1C, 1 << 6 | 2, 0x9A]);
        assert_eq!(
            events[0],
            Event::IncapReport {
                incap: 2,
                value: 0x9A
            }
        );
    }

    #[test]
    fn capsense_report_value() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x1E, 0b10 << 6 | 9, 0xFF]);
        assert_eq!(
            events[0],
            Event::CapSenseReport {
                pin: 9,
                value: 2 | 0xFF << 2
            }
        );
    }

    #[test]
    fn sequencer_event_slot_byte() {
        let mut decoder = EventDecoder::new();
        let events = feed(&mut decoder, &[0x20, 2, 32]);
        assert_eq!(
            events[0],
            Event::SequencerEvent {
                kind: SequencerEventKind::Opened,
                slots: 32
            }
        );

        let events = feed(&mut decoder, &[0x20, 3]);
        assert_eq!(
            events[0],
            Event::SequencerEvent {
                kind: SequencerEventKind::NextCue,
                slots: 0
            }
        );

        assert!(feed(&mut decoder, &[0x20]).is_empty());
        assert_eq!(EventDecoder::new().push(0x20).unwrap(), None);
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut decoder = EventDecoder::new();
        assert_eq!(decoder.push(0x3F), Err(DecodeError::UnknownOpcode(0x3F)));
    }

    #[test]
    fn zero_length_events() {
        let mut decoder = EventDecoder::new();
        assert_eq!(decoder.push(0x23).unwrap(), Some(Event::Sync));
        assert_eq!(decoder.push(0x1D).unwrap(), Some(Event::SoftClose));
        assert_eq!(
            decoder.push(0x05).unwrap(),
            Some(Event::PeriodicDigitalInStatus)
        );
        assert!(decoder.is_idle());
    }

    #[test]
    fn mid_event_is_not_idle() {
        let mut decoder = EventDecoder::new();
        assert_eq!(decoder.push(0x04).unwrap(), None);
        assert!(!decoder.is_idle());
    }
}
