//! Static capability tables per board model.
//!
//! The 8-byte hardware id reported during the handshake selects the table.
//! Tables are immutable; the session attaches one at connect time and every
//! capability check afterwards reads it.

/// Hardware revisions this library knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareVersion {
    Ioio0002,
    Ioio0003,
    Ioio0004,
}

impl HardwareVersion {
    pub fn from_id(id: &[u8; 8]) -> Option<Self> {
        match id {
            b"IOIO0002" => Some(Self::Ioio0002),
            b"IOIO0003" => Some(Self::Ioio0003),
            b"IOIO0004" => Some(Self::Ioio0004),
            _ => None,
        }
    }
}

/// Per-model pin classification and module pools.
#[derive(Debug)]
pub struct Capabilities {
    pub num_pins: u8,
    /// Pins wired to the ADC.
    pub analog_pins: &'static [u8],
    /// Pins remappable as peripheral inputs (UART RX, SPI MISO, INCAP).
    pub peripheral_in_pins: &'static [u8],
    /// Pins remappable as peripheral outputs (UART TX, SPI MOSI/CLK, PWM).
    pub peripheral_out_pins: &'static [u8],
    /// Pins usable for capacitive sensing.
    pub capsense_pins: &'static [u8],
    /// (SDA, SCL) pairs, indexed by TWI module number.
    pub twi_pins: &'static [(u8, u8)],
    /// (PGC, PGD, MCLR) used for in-circuit programming.
    pub icsp_pins: (u8, u8, u8),

    /// Allocatable module ids per pooled kind, in allocation order.
    pub pwm_modules: &'static [u8],
    pub uart_modules: &'static [u8],
    pub spi_modules: &'static [u8],
    pub incap_single_modules: &'static [u8],
    pub incap_double_modules: &'static [u8],
    pub sequencer_modules: &'static [u8],

    /// Firmware-side TX buffer sizes, bytes. Flow control never lets more
    /// than this many unacknowledged bytes accumulate per module.
    pub uart_tx_buffer: usize,
    pub spi_tx_buffer: usize,
    pub twi_tx_buffer: usize,
    pub icsp_tx_buffer: usize,

    /// ADC reference, volts.
    pub reference_voltage: f32,
}

impl Capabilities {
    pub fn num_twi_modules(&self) -> u8 {
        self.twi_pins.len() as u8
    }
}

// All three supported revisions carry the same PIC24 and differ only in
// form factor and connectors.
static IOIO0002_0004: Capabilities = Capabilities {
    num_pins: 49,
    analog_pins: &[
        31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46,
    ],
    peripheral_in_pins: &[
        3, 4, 5, 6, 7, 10, 11, 12, 13, 14, 27, 28, 29, 30, 31, 32, 34, 35, 36, 37, 38, 39, 40,
        45, 46, 47, 48,
    ],
    peripheral_out_pins: &[
        3, 4, 5, 6, 7, 10, 11, 12, 13, 14, 27, 28, 29, 30, 31, 32, 34, 35, 36, 37, 38, 39, 40,
        45, 46, 47, 48,
    ],
    capsense_pins: &[
        31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46,
    ],
    twi_pins: &[(4, 5), (26, 25), (47, 48)],
    icsp_pins: (36, 37, 38),
    pwm_modules: &[0, 1, 2, 3, 4, 5, 6, 7, 8],
    uart_modules: &[0, 1, 2, 3],
    spi_modules: &[0, 1, 2],
    // Double-precision capture chains module pairs (n, n+1), so doubles
    // claim the even ids and singles the remaining high ones.
    incap_single_modules: &[6, 7, 8],
    incap_double_modules: &[0, 2, 4],
    sequencer_modules: &[0],
    uart_tx_buffer: 64,
    spi_tx_buffer: 64,
    twi_tx_buffer: 64,
    icsp_tx_buffer: 64,
    reference_voltage: 3.3,
};

pub fn capabilities(hw: HardwareVersion) -> &'static Capabilities {
    match hw {
        HardwareVersion::Ioio0002 | HardwareVersion::Ioio0003 | HardwareVersion::Ioio0004 => {
            &IOIO0002_0004
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_hardware_ids_resolve() {
        assert_eq!(
            HardwareVersion::from_id(b"IOIO0003"),
            Some(HardwareVersion::Ioio0003)
        );
        assert_eq!(HardwareVersion::from_id(b"IOIO9999"), None);
    }

    #[test]
    fn capability_table_is_consistent() {
        let caps = capabilities(HardwareVersion::Ioio0003);
        assert!(caps.analog_pins.iter().all(|&p| p < caps.num_pins));
        assert!(caps.peripheral_out_pins.iter().all(|&p| p < caps.num_pins));
        for &(sda, scl) in caps.twi_pins {
            assert!(sda < caps.num_pins && scl < caps.num_pins);
        }
        // Single and double capture pools must not collide on module ids.
        for id in caps.incap_single_modules {
            assert!(!caps.incap_double_modules.contains(id));
        }
    }
}
