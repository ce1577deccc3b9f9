//! # ADC clock divider
//!
//! The ADC starts a conversion every `divider` cycles of its clock. The divider register is a
//! 16.8 fixed-point value holding `divider - 1`; the converter itself cannot go faster than one
//! conversion per [`MIN_DIVIDER`] cycles, so smaller settings behave as 96.
//!
//! ```rust
//! use fugit::{HertzU32, RateExtU32};
//! use scope_acquisition::clock::AdcDivider;
//!
//! let adc_clock: HertzU32 = 48.MHz();
//! let divider = AdcDivider::from_sample_rate(1.kHz(), adc_clock);
//!
//! assert_eq!(divider.int_part(), 48_000);
//! assert_eq!(divider.sample_rate(adc_clock), 1.kHz::<1, 1>());
//! ```

use fugit::{HertzU32, NanosDurationU32, RateExtU32};

/// Fractional bits of the divider register
pub const FRAC_BITS: u32 = 8;
const FRAC_MASK: u32 = (1 << FRAC_BITS) - 1;
const ONE: u64 = 1 << FRAC_BITS;

/// Smallest divider the converter honours (one conversion takes 96 ADC clocks)
pub const MIN_DIVIDER: u32 = 96;
/// Largest divider the 16-bit integer field can express
pub const MAX_DIVIDER: u32 = 1 + 0xFFFF;
/// Requests at or above this rate select free-running conversion
pub const MAX_SAMPLE_RATE: HertzU32 = HertzU32::from_raw(500_000);
/// Nominal ADC clock
pub const ADC_CLOCK: HertzU32 = HertzU32::from_raw(48_000_000);

/// Raw ADC clock divider register value
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AdcDivider(u32);

impl AdcDivider {
    /// Free-running conversion at the converter's maximum rate
    pub const FREE_RUNNING: Self = Self(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Divider that gets as close as possible to `rate` without exceeding it
    pub fn from_sample_rate(rate: HertzU32, adc_clock: HertzU32) -> Self {
        if rate >= MAX_SAMPLE_RATE || rate.raw() == 0 {
            return Self::FREE_RUNNING;
        }

        let divider = (adc_clock.raw() as u64 * ONE) / rate.raw() as u64;
        let divider = divider.clamp(ONE, MAX_DIVIDER as u64 * ONE);
        Self((divider - ONE) as u32)
    }

    /// Integer part of the effective divider
    pub fn int_part(self) -> u32 {
        ((self.0 >> FRAC_BITS) + 1).max(MIN_DIVIDER)
    }

    /// Fractional part of the divider, in 1/256 steps
    pub fn frac_part(self) -> u32 {
        self.0 & FRAC_MASK
    }

    /// Same divider with the fractional part dropped
    ///
    /// A fractional divider alternates between two conversion intervals, which shows up as
    /// jitter on high-frequency signals.
    pub fn integer_only(self) -> Self {
        Self(self.0 & !FRAC_MASK)
    }

    /// Effective divider in 1/256 steps, with the converter's minimum applied
    fn effective(self) -> u64 {
        (self.0 as u64 + ONE).max(MIN_DIVIDER as u64 * ONE)
    }

    /// Aggregate conversion rate across all enabled inputs
    pub fn sample_rate(self, adc_clock: HertzU32) -> HertzU32 {
        let rate = adc_clock.raw() as u64 * ONE / self.effective();
        (rate as u32).Hz()
    }

    /// Rate seen by each input when `channels` inputs share the converter round-robin
    pub fn channel_rate(self, adc_clock: HertzU32, channels: u8) -> HertzU32 {
        let rate = self.sample_rate(adc_clock);
        rate / (channels.max(1) as u32)
    }

    /// Time between two consecutive words in the sample stream
    pub fn sample_period(self, adc_clock: HertzU32) -> NanosDurationU32 {
        let nanos = self.effective() * 1_000_000_000 / (adc_clock.raw() as u64 * ONE);
        NanosDurationU32::from_ticks(nanos as u32)
    }
}

#[test]
fn maximum_rate_selects_free_running() {
    assert_eq!(AdcDivider::from_sample_rate(500.kHz(), ADC_CLOCK), AdcDivider::FREE_RUNNING);
    assert_eq!(AdcDivider::from_sample_rate(2.MHz(), ADC_CLOCK), AdcDivider::FREE_RUNNING);
    assert_eq!(AdcDivider::FREE_RUNNING.int_part(), MIN_DIVIDER);
    assert_eq!(AdcDivider::FREE_RUNNING.sample_rate(ADC_CLOCK), 500.kHz::<1, 1>());
}

#[test]
fn integer_dividers_round_trip() {
    for khz in [1u32, 2, 5, 10, 20, 50, 100, 200] {
        let divider = AdcDivider::from_sample_rate(khz.kHz(), ADC_CLOCK);
        assert_eq!(divider.frac_part(), 0);
        assert_eq!(divider.int_part(), 48_000 / khz);
        assert_eq!(divider.sample_rate(ADC_CLOCK), khz.kHz::<1, 1>());
    }
    assert_eq!(AdcDivider::from_sample_rate(1.kHz(), ADC_CLOCK).raw(), 47_999 << 8);
}

#[test]
fn fractional_divider_split() {
    // 48 MHz / 7 kHz = 6857.14
    let divider = AdcDivider::from_sample_rate(7.kHz(), ADC_CLOCK);
    assert_eq!(divider.int_part(), 6857);
    assert_eq!(divider.frac_part(), 36);

    let coarse = divider.integer_only();
    assert_eq!(coarse.frac_part(), 0);
    assert_eq!(coarse.int_part(), 6857);
}

#[test]
fn slow_rates_saturate_divider() {
    let divider = AdcDivider::from_sample_rate(1.Hz(), ADC_CLOCK);
    assert_eq!(divider.int_part(), MAX_DIVIDER);
    assert_eq!(divider.sample_rate(ADC_CLOCK), 732.Hz::<1, 1>());
}

#[test]
fn per_channel_rate_and_period() {
    let divider = AdcDivider::from_sample_rate(200.kHz(), ADC_CLOCK);
    assert_eq!(divider.channel_rate(ADC_CLOCK, 2), 100.kHz::<1, 1>());
    assert_eq!(divider.channel_rate(ADC_CLOCK, 0), 200.kHz::<1, 1>());
    assert_eq!(divider.sample_period(ADC_CLOCK), NanosDurationU32::from_ticks(5_000));
    assert_eq!(
        AdcDivider::FREE_RUNNING.sample_period(ADC_CLOCK),
        NanosDurationU32::from_ticks(2_000)
    );
}
