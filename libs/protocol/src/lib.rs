//! Wire codec for the IOIO board protocol.
//!
//! The board speaks a compact binary command/event protocol over a duplex
//! byte stream. Commands (host to board) and events (board to host) reuse
//! numeric opcodes but have independent layouts, so the two directions are
//! kept in separate tables: the `CMD_*` constants with the `encode_*`
//! functions here, and the `EVT_*` constants with [`EventDecoder`] in
//! [`decode`].
//!
//! Encoders write into a caller-provided buffer and return the encoded
//! length. Multi-byte integers are little-endian.

#![no_std]

pub mod decode;

pub use decode::{DecodeError, Event, EventDecoder, I2cReply, SequencerEventKind};

/// Magic bytes carried by HARD_RESET and the connection handshake.
pub const MAGIC: [u8; 4] = *b"IOIO";

/// Interface id sent with CHECK_INTERFACE. The board accepts the session
/// only if its firmware implements this protocol revision.
pub const INTERFACE_ID: [u8; 8] = *b"IOIO0005";

pub const CMD_HARD_RESET: u8 = 0x00;
pub const CMD_SOFT_RESET: u8 = 0x01;
pub const CMD_CHECK_INTERFACE: u8 = 0x02;
pub const CMD_SET_PIN_DIGITAL_OUT: u8 = 0x03;
pub const CMD_SET_DIGITAL_OUT_LEVEL: u8 = 0x04;
pub const CMD_SET_PIN_DIGITAL_IN: u8 = 0x05;
pub const CMD_SET_CHANGE_NOTIFY: u8 = 0x06;
/// Reserved; the firmware leaves this unimplemented and so do we.
pub const CMD_REGISTER_PERIODIC_DIGITAL_SAMPLING: u8 = 0x07;
pub const CMD_SET_PIN_PWM: u8 = 0x08;
pub const CMD_SET_PWM_DUTY_CYCLE: u8 = 0x09;
pub const CMD_SET_PWM_PERIOD: u8 = 0x0A;
pub const CMD_SET_PIN_ANALOG_IN: u8 = 0x0B;
pub const CMD_SET_ANALOG_IN_SAMPLING: u8 = 0x0C;
pub const CMD_UART_CONFIG: u8 = 0x0D;
pub const CMD_UART_DATA: u8 = 0x0E;
pub const CMD_SET_PIN_UART: u8 = 0x0F;
pub const CMD_SPI_CONFIGURE_MASTER: u8 = 0x10;
pub const CMD_SPI_MASTER_REQUEST: u8 = 0x11;
pub const CMD_SET_PIN_SPI: u8 = 0x12;
pub const CMD_I2C_CONFIGURE_MASTER: u8 = 0x13;
pub const CMD_I2C_WRITE_READ: u8 = 0x14;
pub const CMD_ICSP_SIX: u8 = 0x16;
pub const CMD_ICSP_REGOUT: u8 = 0x17;
pub const CMD_ICSP_PROG_ENTER: u8 = 0x18;
pub const CMD_ICSP_PROG_EXIT: u8 = 0x19;
pub const CMD_ICSP_CONFIG: u8 = 0x1A;
pub const CMD_INCAP_CONFIGURE: u8 = 0x1B;
pub const CMD_SET_PIN_INCAP: u8 = 0x1C;
pub const CMD_SOFT_CLOSE: u8 = 0x1D;
pub const CMD_SET_PIN_CAPSENSE: u8 = 0x1E;
pub const CMD_SET_CAPSENSE_SAMPLING: u8 = 0x1F;
pub const CMD_SEQUENCER_CONFIGURE: u8 = 0x20;
pub const CMD_SEQUENCER_PUSH: u8 = 0x21;
pub const CMD_SEQUENCER_CONTROL: u8 = 0x22;
pub const CMD_SYNC: u8 = 0x23;

/// Upper bound on a single UART_DATA payload.
pub const MAX_UART_DATA: usize = 64;
/// Upper bound on an SPI transaction (write plus padding).
pub const MAX_SPI_TOTAL: usize = 64;
/// Upper bound on an I2C write payload.
pub const MAX_I2C_WRITE: usize = 64;
/// Upper bound on sequencer channel configuration and cue blocks.
pub const MAX_SEQUENCER_BLOCK: usize = 68;

/// Largest encoding any single command produces (SEQUENCER_PUSH).
pub const MAX_COMMAND_LEN: usize = 3 + MAX_SEQUENCER_BLOCK;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    BufferTooSmall,
    /// A variable-length payload exceeds its wire limit.
    DataTooLong,
    /// A numeric field does not fit its bit slot.
    ValueOutOfRange,
}

/// Input-pin termination, as encoded in SET_PIN_DIGITAL_IN.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PullMode {
    #[default]
    Floating = 0,
    PullUp = 1,
    PullDown = 2,
}

/// UART parity, as encoded in UART_CONFIG.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Even = 1,
    Odd = 2,
}

/// PWM timer prescaler. The wire encoding is not monotone in the divisor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerScale {
    X1,
    X8,
    X64,
    X256,
}

impl TimerScale {
    pub const ALL: [TimerScale; 4] = [
        TimerScale::X1,
        TimerScale::X8,
        TimerScale::X64,
        TimerScale::X256,
    ];

    pub const fn divisor(self) -> u32 {
        match self {
            TimerScale::X1 => 1,
            TimerScale::X8 => 8,
            TimerScale::X64 => 64,
            TimerScale::X256 => 256,
        }
    }

    const fn encoding(self) -> u8 {
        match self {
            TimerScale::X1 => 0,
            TimerScale::X8 => 3,
            TimerScale::X64 => 2,
            TimerScale::X256 => 1,
        }
    }
}

/// Role of a pin mapped to an SPI module.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpiPinMode {
    Mosi = 0,
    Miso = 1,
    Clk = 2,
}

/// SPI clock rate codes. 0 is reserved for closing the module.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpiRate {
    Rate125KHz = 1,
    Rate250KHz = 2,
    Rate500KHz = 3,
    Rate1MHz = 4,
    Rate2MHz = 5,
    Rate4MHz = 6,
    Rate8MHz = 7,
}

/// TWI/I2C bus rate codes. 0 is reserved for closing the module.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TwiRate {
    Rate100KHz = 1,
    Rate400KHz = 2,
    Rate1MHz = 3,
}

/// Input-capture trigger mode. 0 is reserved for closing the module.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IncapMode {
    PositivePulse = 1,
    NegativePulse = 2,
    Frequency = 3,
    FrequencyDiv4 = 4,
    FrequencyDiv16 = 5,
}

/// Input-capture time base.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IncapClock {
    Rate16MHz = 0,
    Rate2MHz = 1,
    Rate250KHz = 2,
    Rate62_5KHz = 3,
}

impl IncapClock {
    pub const fn hertz(self) -> u32 {
        match self {
            IncapClock::Rate16MHz => 16_000_000,
            IncapClock::Rate2MHz => 2_000_000,
            IncapClock::Rate250KHz => 250_000,
            IncapClock::Rate62_5KHz => 62_500,
        }
    }
}

fn ensure(out: &[u8], len: usize) -> Result<(), EncodeError> {
    if out.len() < len {
        Err(EncodeError::BufferTooSmall)
    } else {
        Ok(())
    }
}

pub fn encode_hard_reset(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 5)?;
    out[0] = CMD_HARD_RESET;
    out[1..5].copy_from_slice(&MAGIC);
    Ok(5)
}

pub fn encode_soft_reset(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 1)?;
    out[0] = CMD_SOFT_RESET;
    Ok(1)
}

pub fn encode_soft_close(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 1)?;
    out[0] = CMD_SOFT_CLOSE;
    Ok(1)
}

pub fn encode_check_interface(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 9)?;
    out[0] = CMD_CHECK_INTERFACE;
    out[1..9].copy_from_slice(&INTERFACE_ID);
    Ok(9)
}

pub fn encode_set_pin_digital_out(
    pin: u8,
    open_drain: bool,
    value: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_PIN_DIGITAL_OUT;
    out[1] = pin << 2 | u8::from(open_drain) | u8::from(value) << 1;
    Ok(2)
}

pub fn encode_set_digital_out_level(
    pin: u8,
    value: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_DIGITAL_OUT_LEVEL;
    out[1] = pin << 2 | u8::from(value);
    Ok(2)
}

pub fn encode_set_pin_digital_in(
    pin: u8,
    pull: PullMode,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_PIN_DIGITAL_IN;
    out[1] = pin << 2 | pull as u8;
    Ok(2)
}

pub fn encode_set_change_notify(
    pin: u8,
    notify: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_CHANGE_NOTIFY;
    out[1] = pin << 2 | u8::from(notify);
    Ok(2)
}

pub fn encode_set_pin_pwm(
    pin: u8,
    pwm_num: u8,
    enable: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F || pwm_num > 0x0F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_SET_PIN_PWM;
    out[1] = pin;
    out[2] = if enable { 0x80 } else { 0 } | pwm_num;
    Ok(3)
}

/// `fraction` is the sub-tick part of the duty cycle in quarter ticks.
pub fn encode_set_pwm_duty_cycle(
    pwm_num: u8,
    duty: u16,
    fraction: u8,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pwm_num > 0x0F || fraction > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 4)?;
    out[0] = CMD_SET_PWM_DUTY_CYCLE;
    out[1] = pwm_num << 2 | fraction;
    out[2..4].copy_from_slice(&duty.to_le_bytes());
    Ok(4)
}

pub fn encode_set_pwm_period(
    pwm_num: u8,
    scale: TimerScale,
    period: u16,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pwm_num > 0x0F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 4)?;
    let enc = scale.encoding();
    out[0] = CMD_SET_PWM_PERIOD;
    out[1] = (enc & 2) << 6 | pwm_num << 1 | (enc & 1);
    out[2..4].copy_from_slice(&period.to_le_bytes());
    Ok(4)
}

pub fn encode_set_pin_analog_in(pin: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_PIN_ANALOG_IN;
    out[1] = pin;
    Ok(2)
}

pub fn encode_set_analog_in_sampling(
    pin: u8,
    enable: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_ANALOG_IN_SAMPLING;
    out[1] = if enable { 0x80 } else { 0 } | pin;
    Ok(2)
}

/// `rate` is the raw baud divisor for the selected 1x/4x mode.
pub fn encode_uart_config(
    uart: u8,
    rate: u16,
    speed4x: bool,
    two_stop_bits: bool,
    parity: Parity,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if uart > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 4)?;
    out[0] = CMD_UART_CONFIG;
    out[1] = uart << 6
        | if speed4x { 0x08 } else { 0 }
        | if two_stop_bits { 0x04 } else { 0 }
        | parity as u8;
    out[2..4].copy_from_slice(&rate.to_le_bytes());
    Ok(4)
}

/// Closing a UART is a config write with everything zeroed.
pub fn encode_uart_close(uart: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    if uart > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 4)?;
    out[0] = CMD_UART_CONFIG;
    out[1] = uart << 6;
    out[2] = 0;
    out[3] = 0;
    Ok(4)
}

pub fn encode_uart_data(uart: u8, data: &[u8], out: &mut [u8]) -> Result<usize, EncodeError> {
    if uart > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    if data.is_empty() || data.len() > MAX_UART_DATA {
        return Err(EncodeError::DataTooLong);
    }
    let total = 2 + data.len();
    ensure(out, total)?;
    out[0] = CMD_UART_DATA;
    out[1] = (data.len() as u8 - 1) | uart << 6;
    out[2..total].copy_from_slice(data);
    Ok(total)
}

pub fn encode_set_pin_uart(
    pin: u8,
    uart: u8,
    tx: bool,
    enable: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F || uart > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_SET_PIN_UART;
    out[1] = pin;
    out[2] = if enable { 0x80 } else { 0 } | if tx { 0x40 } else { 0 } | uart;
    Ok(3)
}

pub fn encode_spi_configure_master(
    spi: u8,
    rate: SpiRate,
    sample_on_trailing: bool,
    invert_clk: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if spi > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_SPI_CONFIGURE_MASTER;
    out[1] = spi << 5 | rate as u8;
    out[2] = if sample_on_trailing { 0 } else { 2 } | u8::from(invert_clk);
    Ok(3)
}

pub fn encode_spi_close(spi: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    if spi > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_SPI_CONFIGURE_MASTER;
    out[1] = spi << 5;
    out[2] = 0;
    Ok(3)
}

/// `total` covers the whole transaction; `data` is transmitted, the slave's
/// reply is trimmed to the trailing `resp_size` bytes. Sizes equal to
/// `total` are elided from the wire.
pub fn encode_spi_master_request(
    spi: u8,
    ss_pin: u8,
    data: &[u8],
    total: usize,
    resp_size: usize,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if spi > 3 || ss_pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    if total == 0 || total > MAX_SPI_TOTAL || data.len() > total || resp_size > total {
        return Err(EncodeError::DataTooLong);
    }
    let data_differs = data.len() != total;
    let resp_differs = resp_size != total;
    let header = 3 + usize::from(data_differs) + usize::from(resp_differs);
    ensure(out, header + data.len())?;
    out[0] = CMD_SPI_MASTER_REQUEST;
    out[1] = spi << 6 | ss_pin;
    out[2] = if data_differs { 0x80 } else { 0 }
        | if resp_differs { 0x40 } else { 0 }
        | (total as u8 - 1);
    let mut at = 3;
    if data_differs {
        out[at] = data.len() as u8;
        at += 1;
    }
    if resp_differs {
        out[at] = resp_size as u8;
        at += 1;
    }
    out[at..at + data.len()].copy_from_slice(data);
    Ok(at + data.len())
}

pub fn encode_set_pin_spi(
    pin: u8,
    spi: u8,
    mode: SpiPinMode,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F || spi > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_SET_PIN_SPI;
    out[1] = pin;
    out[2] = 0x10 | (mode as u8) << 2 | spi;
    Ok(3)
}

pub fn encode_i2c_configure_master(
    i2c: u8,
    rate: TwiRate,
    smbus_levels: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if i2c > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_I2C_CONFIGURE_MASTER;
    out[1] = if smbus_levels { 0x80 } else { 0 } | (rate as u8) << 5 | i2c;
    Ok(2)
}

pub fn encode_i2c_close(i2c: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    if i2c > 3 {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_I2C_CONFIGURE_MASTER;
    out[1] = i2c;
    Ok(2)
}

pub fn encode_i2c_write_read(
    i2c: u8,
    address: u16,
    ten_bit_addr: bool,
    read_size: usize,
    write: &[u8],
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if i2c > 3 || address > 0x3FF || (!ten_bit_addr && address > 0x7F) {
        return Err(EncodeError::ValueOutOfRange);
    }
    if write.len() > MAX_I2C_WRITE || read_size > MAX_I2C_WRITE {
        return Err(EncodeError::DataTooLong);
    }
    let total = 5 + write.len();
    ensure(out, total)?;
    out[0] = CMD_I2C_WRITE_READ;
    out[1] = ((address >> 8) as u8) << 6 | if ten_bit_addr { 0x20 } else { 0 } | i2c;
    out[2] = (address & 0xFF) as u8;
    out[3] = write.len() as u8;
    out[4] = read_size as u8;
    out[5..total].copy_from_slice(write);
    Ok(total)
}

pub fn encode_icsp_config(open: bool, out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 2)?;
    out[0] = CMD_ICSP_CONFIG;
    out[1] = u8::from(open);
    Ok(2)
}

pub fn encode_icsp_prog_enter(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 1)?;
    out[0] = CMD_ICSP_PROG_ENTER;
    Ok(1)
}

pub fn encode_icsp_prog_exit(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 1)?;
    out[0] = CMD_ICSP_PROG_EXIT;
    Ok(1)
}

/// `instruction` is a 24-bit SIX opcode for the target PIC.
pub fn encode_icsp_six(instruction: u32, out: &mut [u8]) -> Result<usize, EncodeError> {
    if instruction > 0x00FF_FFFF {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 4)?;
    out[0] = CMD_ICSP_SIX;
    out[1..4].copy_from_slice(&instruction.to_le_bytes()[..3]);
    Ok(4)
}

pub fn encode_icsp_regout(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 1)?;
    out[0] = CMD_ICSP_REGOUT;
    Ok(1)
}

pub fn encode_set_pin_incap(
    pin: u8,
    incap: u8,
    enable: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F || incap > 0x0F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_SET_PIN_INCAP;
    out[1] = pin;
    out[2] = incap | if enable { 0x80 } else { 0 };
    Ok(3)
}

pub fn encode_incap_configure(
    incap: u8,
    double_precision: bool,
    mode: IncapMode,
    clock: IncapClock,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if incap > 0x0F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_INCAP_CONFIGURE;
    out[1] = incap;
    out[2] = if double_precision { 0x80 } else { 0 } | (mode as u8) << 3 | clock as u8;
    Ok(3)
}

pub fn encode_incap_close(incap: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    if incap > 0x0F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 3)?;
    out[0] = CMD_INCAP_CONFIGURE;
    out[1] = incap;
    out[2] = 0;
    Ok(3)
}

pub fn encode_set_pin_capsense(pin: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_PIN_CAPSENSE;
    out[1] = pin;
    Ok(2)
}

pub fn encode_set_capsense_sampling(
    pin: u8,
    enable: bool,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if pin > 0x3F {
        return Err(EncodeError::ValueOutOfRange);
    }
    ensure(out, 2)?;
    out[0] = CMD_SET_CAPSENSE_SAMPLING;
    out[1] = if enable { 0x80 } else { 0 } | pin;
    Ok(2)
}

/// An empty `config` closes the sequencer.
pub fn encode_sequencer_configure(config: &[u8], out: &mut [u8]) -> Result<usize, EncodeError> {
    if config.len() > MAX_SEQUENCER_BLOCK {
        return Err(EncodeError::DataTooLong);
    }
    let total = 2 + config.len();
    ensure(out, total)?;
    out[0] = CMD_SEQUENCER_CONFIGURE;
    out[1] = config.len() as u8;
    out[2..total].copy_from_slice(config);
    Ok(total)
}

/// `duration` is in 62.5 kHz ticks. The cue size is fixed by the channel
/// configuration sent with SEQUENCER_CONFIGURE.
pub fn encode_sequencer_push(
    duration: u16,
    cue: &[u8],
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if cue.len() > MAX_SEQUENCER_BLOCK {
        return Err(EncodeError::DataTooLong);
    }
    let total = 3 + cue.len();
    ensure(out, total)?;
    out[0] = CMD_SEQUENCER_PUSH;
    out[1..3].copy_from_slice(&duration.to_le_bytes());
    out[3..total].copy_from_slice(cue);
    Ok(total)
}

const SEQ_ACTION_STOP: u8 = 0;
const SEQ_ACTION_START: u8 = 1;
const SEQ_ACTION_PAUSE: u8 = 2;
const SEQ_ACTION_MANUAL_START: u8 = 3;
const SEQ_ACTION_MANUAL_STOP: u8 = 4;

fn encode_sequencer_action(action: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 2)?;
    out[0] = CMD_SEQUENCER_CONTROL;
    out[1] = action;
    Ok(2)
}

pub fn encode_sequencer_stop(out: &mut [u8]) -> Result<usize, EncodeError> {
    encode_sequencer_action(SEQ_ACTION_STOP, out)
}

pub fn encode_sequencer_start(out: &mut [u8]) -> Result<usize, EncodeError> {
    encode_sequencer_action(SEQ_ACTION_START, out)
}

pub fn encode_sequencer_pause(out: &mut [u8]) -> Result<usize, EncodeError> {
    encode_sequencer_action(SEQ_ACTION_PAUSE, out)
}

/// Drives the channels with `cue` immediately, outside the cue queue.
pub fn encode_sequencer_manual_start(cue: &[u8], out: &mut [u8]) -> Result<usize, EncodeError> {
    if cue.len() > MAX_SEQUENCER_BLOCK {
        return Err(EncodeError::DataTooLong);
    }
    let total = 2 + cue.len();
    ensure(out, total)?;
    out[0] = CMD_SEQUENCER_CONTROL;
    out[1] = SEQ_ACTION_MANUAL_START;
    out[2..total].copy_from_slice(cue);
    Ok(total)
}

pub fn encode_sequencer_manual_stop(out: &mut [u8]) -> Result<usize, EncodeError> {
    encode_sequencer_action(SEQ_ACTION_MANUAL_STOP, out)
}

pub fn encode_sync(out: &mut [u8]) -> Result<usize, EncodeError> {
    ensure(out, 1)?;
    out[0] = CMD_SYNC;
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_reset_carries_magic() {
        let mut out = [0u8; 8];
        let len = encode_hard_reset(&mut out).unwrap();
        assert_eq!(&out[..len], &[0x00, b'I', b'O', b'I', b'O']);
    }

    #[test]
    fn check_interface_carries_interface_id() {
        let mut out = [0u8; 16];
        let len = encode_check_interface(&mut out).unwrap();
        assert_eq!(len, 9);
        assert_eq!(out[0], 0x02);
        assert_eq!(&out[1..9], b"IOIO0005");
    }

    #[test]
    fn digital_blink_sequence() {
        // Open pin 13 as output low, write high, write low, close.
        let mut wire = [0u8; 16];
        let mut at = 0;
        at += encode_set_pin_digital_out(13, false, false, &mut wire[at..]).unwrap();
        at += encode_set_digital_out_level(13, true, &mut wire[at..]).unwrap();
        at += encode_set_digital_out_level(13, false, &mut wire[at..]).unwrap();
        at += encode_set_pin_digital_in(13, PullMode::Floating, &mut wire[at..]).unwrap();
        assert_eq!(&wire[..at], &[0x03, 0x34, 0x04, 0x35, 0x04, 0x34, 0x05, 0x34]);
    }

    #[test]
    fn digital_out_open_drain_bit() {
        let mut out = [0u8; 2];
        encode_set_pin_digital_out(5, true, true, &mut out).unwrap();
        assert_eq!(out, [0x03, 5 << 2 | 0x02 | 0x01]);
    }

    #[test]
    fn digital_in_pull_encoding() {
        let mut out = [0u8; 2];
        encode_set_pin_digital_in(1, PullMode::PullUp, &mut out).unwrap();
        assert_eq!(out[1], 1 << 2 | 1);
        encode_set_pin_digital_in(1, PullMode::PullDown, &mut out).unwrap();
        assert_eq!(out[1], 1 << 2 | 2);
    }

    #[test]
    fn analog_open_sequence() {
        let mut wire = [0u8; 4];
        let mut at = 0;
        at += encode_set_pin_analog_in(31, &mut wire[at..]).unwrap();
        at += encode_set_analog_in_sampling(31, true, &mut wire[at..]).unwrap();
        assert_eq!(&wire[..at], &[0x0B, 0x1F, 0x0C, 0x9F]);
    }

    #[test]
    fn pwm_setup_1khz_pin10() {
        // 16 MHz base, 1x scale, period register 15999.
        let mut wire = [0u8; 16];
        let mut at = 0;
        at += encode_set_pin_digital_out(10, false, false, &mut wire[at..]).unwrap();
        at += encode_set_pin_pwm(10, 0, true, &mut wire[at..]).unwrap();
        at += encode_set_pwm_period(0, TimerScale::X1, 15_999, &mut wire[at..]).unwrap();
        assert_eq!(
            &wire[..at],
            &[0x03, 0x28, 0x08, 0x0A, 0x80, 0x0A, 0x00, 0x7F, 0x3E]
        );
    }

    #[test]
    fn pwm_period_scale_encodings() {
        // 1x -> 0, 8x -> 3, 64x -> 2, 256x -> 1, split across bit 7 and bit 0.
        let cases = [
            (TimerScale::X1, 0u8, 0u8),
            (TimerScale::X8, 0x80, 1),
            (TimerScale::X64, 0x80, 0),
            (TimerScale::X256, 0x00, 1),
        ];
        for (scale, high, low) in cases {
            let mut out = [0u8; 4];
            encode_set_pwm_period(3, scale, 0x1234, &mut out).unwrap();
            assert_eq!(out[1], high | 3 << 1 | low, "{scale:?}");
            assert_eq!(&out[2..4], &[0x34, 0x12]);
        }
    }

    #[test]
    fn pwm_duty_cycle_fraction() {
        let mut out = [0u8; 4];
        encode_set_pwm_duty_cycle(2, 0x0102, 3, &mut out).unwrap();
        assert_eq!(out, [0x09, 2 << 2 | 3, 0x02, 0x01]);
        assert_eq!(
            encode_set_pwm_duty_cycle(2, 0, 4, &mut out),
            Err(EncodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn uart_config_fields() {
        let mut out = [0u8; 4];
        encode_uart_config(2, 0x0067, true, false, Parity::Even, &mut out).unwrap();
        assert_eq!(out, [0x0D, 2 << 6 | 0x08 | 0x01, 0x67, 0x00]);

        encode_uart_close(1, &mut out).unwrap();
        assert_eq!(out, [0x0D, 1 << 6, 0x00, 0x00]);
    }

    #[test]
    fn uart_data_length_bits() {
        let mut out = [0u8; 80];
        let len = encode_uart_data(1, &[0xAA, 0xBB, 0xCC], &mut out).unwrap();
        assert_eq!(&out[..len], &[0x0E, 1 << 6 | 2, 0xAA, 0xBB, 0xCC]);

        let full = [0u8; 64];
        let len = encode_uart_data(0, &full, &mut out).unwrap();
        assert_eq!(len, 66);
        assert_eq!(out[1], 63);

        let over = [0u8; 65];
        assert_eq!(
            encode_uart_data(0, &over, &mut out),
            Err(EncodeError::DataTooLong)
        );
        assert_eq!(
            encode_uart_data(0, &[], &mut out),
            Err(EncodeError::DataTooLong)
        );
    }

    #[test]
    fn spi_request_with_padding_and_trim() {
        // writeRead(slave 0, write [23 45], total 4, read 3).
        let mut out = [0u8; 16];
        let len = encode_spi_master_request(0, 0, &[0x23, 0x45], 4, 3, &mut out).unwrap();
        assert_eq!(&out[..len], &[0x11, 0x00, 0xC3, 0x02, 0x03, 0x23, 0x45]);
    }

    #[test]
    fn spi_request_full_frame_elides_sizes() {
        let mut out = [0u8; 16];
        let len = encode_spi_master_request(1, 2, &[0xDE, 0xAD], 2, 2, &mut out).unwrap();
        assert_eq!(&out[..len], &[0x11, 1 << 6 | 2, 0x01, 0xDE, 0xAD]);
    }

    #[test]
    fn spi_pin_assignment() {
        let mut out = [0u8; 3];
        encode_set_pin_spi(4, 1, SpiPinMode::Miso, &mut out).unwrap();
        assert_eq!(out, [0x12, 4, 0x10 | 1 << 2 | 1]);
    }

    #[test]
    fn i2c_configure_and_close() {
        let mut out = [0u8; 2];
        encode_i2c_configure_master(2, TwiRate::Rate400KHz, true, &mut out).unwrap();
        assert_eq!(out, [0x13, 0x80 | 2 << 5 | 2]);
        encode_i2c_close(2, &mut out).unwrap();
        assert_eq!(out, [0x13, 0x02]);
    }

    #[test]
    fn i2c_write_read_ten_bit_address() {
        let mut out = [0u8; 16];
        let len = encode_i2c_write_read(1, 0x234, true, 2, &[0x42], &mut out).unwrap();
        assert_eq!(&out[..len], &[0x14, 2 << 6 | 0x20 | 1, 0x34, 0x01, 0x02, 0x42]);
    }

    #[test]
    fn i2c_seven_bit_address_is_range_checked() {
        let mut out = [0u8; 16];
        assert_eq!(
            encode_i2c_write_read(0, 0x80, false, 0, &[], &mut out),
            Err(EncodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn icsp_six_is_24_bit_le() {
        let mut out = [0u8; 4];
        let len = encode_icsp_six(0x040200, &mut out).unwrap();
        assert_eq!(&out[..len], &[0x16, 0x00, 0x02, 0x04]);
        assert_eq!(
            encode_icsp_six(0x0100_0000, &mut out),
            Err(EncodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn incap_configure_and_close() {
        let mut out = [0u8; 3];
        encode_incap_configure(
            2,
            true,
            IncapMode::Frequency,
            IncapClock::Rate250KHz,
            &mut out,
        )
        .unwrap();
        assert_eq!(out, [0x1B, 2, 0x80 | 3 << 3 | 2]);
        encode_incap_close(2, &mut out).unwrap();
        assert_eq!(out, [0x1B, 2, 0]);
    }

    #[test]
    fn capsense_sampling_bit() {
        let mut out = [0u8; 2];
        encode_set_capsense_sampling(9, true, &mut out).unwrap();
        assert_eq!(out, [0x1F, 0x89]);
        encode_set_capsense_sampling(9, false, &mut out).unwrap();
        assert_eq!(out, [0x1F, 0x09]);
    }

    #[test]
    fn sequencer_blocks_are_length_limited() {
        let mut out = [0u8; 80];
        let cfg = [0u8; 69];
        assert_eq!(
            encode_sequencer_configure(&cfg, &mut out),
            Err(EncodeError::DataTooLong)
        );

        let len = encode_sequencer_configure(&cfg[..2], &mut out).unwrap();
        assert_eq!(&out[..len], &[0x20, 2, 0, 0]);

        let len = encode_sequencer_push(0x0102, &[0xAB], &mut out).unwrap();
        assert_eq!(&out[..len], &[0x21, 0x02, 0x01, 0xAB]);
    }

    #[test]
    fn sequencer_control_actions() {
        let mut out = [0u8; 8];
        encode_sequencer_stop(&mut out).unwrap();
        assert_eq!(&out[..2], &[0x22, 0]);
        encode_sequencer_start(&mut out).unwrap();
        assert_eq!(&out[..2], &[0x22, 1]);
        encode_sequencer_pause(&mut out).unwrap();
        assert_eq!(&out[..2], &[0x22, 2]);
        let len = encode_sequencer_manual_start(&[0x07], &mut out).unwrap();
        assert_eq!(&out[..len], &[0x22, 3, 0x07]);
        encode_sequencer_manual_stop(&mut out).unwrap();
        assert_eq!(&out[..2], &[0x22, 4]);
    }

    #[test]
    fn encoders_reject_small_buffers() {
        let mut out = [0u8; 1];
        assert_eq!(
            encode_set_pin_digital_out(0, false, false, &mut out),
            Err(EncodeError::BufferTooSmall)
        );
        assert_eq!(encode_sync(&mut out), Ok(1));
    }

    #[test]
    fn pin_fields_are_range_checked() {
        let mut out = [0u8; 4];
        assert_eq!(
            encode_set_digital_out_level(64, true, &mut out),
            Err(EncodeError::ValueOutOfRange)
        );
        assert_eq!(
            encode_set_pin_uart(0, 4, false, true, &mut out),
            Err(EncodeError::ValueOutOfRange)
        );
    }
}
