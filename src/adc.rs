//! # ADC side of the hardware contract
//!
//! The engine never touches ADC registers. The board support code implements [`AdcControl`] for
//! its converter and hands it to [`Engine::new`](crate::engine::Engine::new).

use crate::clock::AdcDivider;
use crate::config::MAX_CHANNELS;
use crate::trigger::SampleWidth;

bitflags::bitflags! {
    /// Inputs visited by round-robin conversion
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct InputMask: u8 {
        const AIN0 = 1 << 0;
        const AIN1 = 1 << 1;
        const AIN2 = 1 << 2;
        const AIN3 = 1 << 3;
        const TEMPERATURE = 1 << 4;
    }
}

impl InputMask {
    /// Mask for `channels` interleaved inputs starting at input 0
    ///
    /// A single channel disables round-robin altogether so the converter stays on the selected
    /// input.
    pub fn round_robin(channels: u8) -> Self {
        match channels.min(MAX_CHANNELS) {
            0 | 1 => InputMask::empty(),
            n => InputMask::from_bits_truncate((1 << n) - 1),
        }
    }
}

/// Number of words between two samples of the same input in the interleaved stream
pub fn round_robin_divider(channels: u8) -> usize {
    channels.max(1) as usize
}

/// FIFO settings applied before every capture
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FifoConfig {
    /// Results go to the FIFO instead of only the result register
    pub enable: bool,
    /// Raise a DMA request when the FIFO reaches `threshold`
    pub dreq: bool,
    pub threshold: u8,
    /// Keep the conversion error flag in bit 15 of each word
    pub error_flag: bool,
    /// Shift results right to 8 bits
    pub byte_shift: bool,
}

impl FifoConfig {
    pub fn for_width(width: SampleWidth) -> Self {
        FifoConfig {
            byte_shift: width == SampleWidth::U8,
            ..Default::default()
        }
    }
}

impl Default for FifoConfig {
    /// DMA-paced, one word per request, plain 12-bit results
    fn default() -> Self {
        FifoConfig {
            enable: true,
            dreq: true,
            threshold: 1,
            error_flag: false,
            byte_shift: false,
        }
    }
}

/// Converter operations the acquisition engine relies on
///
/// All calls are synchronous from software's point of view.
pub trait AdcControl {
    /// Returns the converter to its reset configuration and drains the FIFO
    fn reset(&mut self);

    /// Starts (`true`) or stops (`false`) free-running conversion
    fn run(&mut self, enable: bool);

    /// Input used for the next conversion
    fn select_input(&mut self, input: u8);

    /// Inputs visited after each conversion; empty disables round-robin
    fn set_round_robin(&mut self, inputs: InputMask);

    fn set_clock_divider(&mut self, divider: AdcDivider);

    fn configure_fifo(&mut self, fifo: FifoConfig);
}

#[test]
fn round_robin_masks() {
    assert_eq!(InputMask::round_robin(0), InputMask::empty());
    assert_eq!(InputMask::round_robin(1), InputMask::empty());
    assert_eq!(InputMask::round_robin(2), InputMask::AIN0 | InputMask::AIN1);
    assert_eq!(
        InputMask::round_robin(4),
        InputMask::AIN0 | InputMask::AIN1 | InputMask::AIN2 | InputMask::AIN3
    );
    assert_eq!(InputMask::round_robin(9), InputMask::round_robin(MAX_CHANNELS));
    assert_eq!(round_robin_divider(0), 1);
    assert_eq!(round_robin_divider(3), 3);
}

#[test]
fn fifo_shift_follows_width() {
    assert!(!FifoConfig::for_width(SampleWidth::U12).byte_shift);
    assert!(FifoConfig::for_width(SampleWidth::U8).byte_shift);
    assert_eq!(FifoConfig::for_width(SampleWidth::U12), FifoConfig::default());
}
