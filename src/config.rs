//! # Acquisition configuration
//!
//! The record the controller publishes before every start command. It is copied by value into
//! the engine at the start of each capture, so the engine never sees a half-written update.
//!
//! ```rust
//! use fugit::RateExtU32;
//! use scope_acquisition::{clock::ADC_CLOCK, AcquisitionConfig, SampleWidth};
//!
//! let config = AcquisitionConfig::default()
//!     .samples(2048)
//!     .channels(2)
//!     .sample_rate(200.kHz(), ADC_CLOCK)
//!     .sample_width(SampleWidth::U12);
//!
//! assert!(config.validate(110_000).is_ok());
//! assert_eq!(config.pretrigger_samples() + config.posttrigger_samples(), 2048);
//! ```

use fugit::HertzU32;

use crate::clock::{AdcDivider, MAX_SAMPLE_RATE};
use crate::trigger::{SampleWidth, TriggerSettings};

/// Largest number of interleaved input channels
pub const MAX_CHANNELS: u8 = 4;

/// Capture lengths offered to the user
pub const SAMPLE_SIZES: [usize; 4] = [1024, 2048, 4096, 8192];

/// Aggregate sample rates offered to the user, in Hz
pub const SAMPLE_RATES: [u32; 9] = [
    1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000, 500_000,
];

/// Reasons a configuration cannot be published as is
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A capture must contain at least one sample
    NoSamples,
    /// The window does not fit in the sample buffer
    TooManySamples { requested: usize, capacity: usize },
    /// Channel count outside `1..=MAX_CHANNELS`
    Channels(u8),
    /// Trigger channel is not one of the enabled channels
    TriggerChannel(u8),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Words in the capture window, all channels together
    pub samples: usize,
    /// Inputs converted round-robin, starting at input 0
    pub channels: u8,
    pub divider: AdcDivider,
    pub trigger: TriggerSettings,
    pub width: SampleWidth,
}

impl AcquisitionConfig {
    /// 1024 samples of one channel at 500 kS/s, 12-bit, default trigger
    pub const DEFAULT: Self = AcquisitionConfig {
        samples: SAMPLE_SIZES[0],
        channels: 1,
        divider: AdcDivider::FREE_RUNNING,
        trigger: TriggerSettings::DEFAULT,
        width: SampleWidth::U12,
    };

    pub fn samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn divider(mut self, divider: AdcDivider) -> Self {
        self.divider = divider;
        self
    }

    pub fn sample_rate(mut self, rate: HertzU32, adc_clock: HertzU32) -> Self {
        self.divider = AdcDivider::from_sample_rate(rate.min(MAX_SAMPLE_RATE), adc_clock);
        self
    }

    pub fn trigger(mut self, trigger: TriggerSettings) -> Self {
        self.trigger = trigger;
        self.trigger.set_sample_width(self.width);
        self
    }

    pub fn sample_width(mut self, width: SampleWidth) -> Self {
        self.width = width;
        self.trigger.set_sample_width(width);
        self
    }

    /// Samples recorded before the trigger instant
    pub fn pretrigger_samples(&self) -> usize {
        self.trigger.pretrigger_count(self.samples)
    }

    /// Samples recorded from the trigger instant on
    pub fn posttrigger_samples(&self) -> usize {
        self.samples - self.pretrigger_samples()
    }

    /// Checks the configuration against a buffer of `capacity` words
    pub fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        if self.samples == 0 {
            return Err(ConfigError::NoSamples);
        }
        if self.samples > capacity {
            return Err(ConfigError::TooManySamples {
                requested: self.samples,
                capacity,
            });
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::Channels(self.channels));
        }
        if self.trigger.channel() >= self.channels {
            return Err(ConfigError::TriggerChannel(self.trigger.channel()));
        }
        Ok(())
    }

    /// Nearest configuration that passes [`AcquisitionConfig::validate`]
    pub fn clamped(mut self, capacity: usize) -> Self {
        self.samples = self.samples.clamp(1.min(capacity), capacity);
        self.channels = self.channels.clamp(1, MAX_CHANNELS);
        if self.trigger.channel() >= self.channels {
            self.trigger.set_channel(0);
        }
        self
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[test]
fn window_split_always_adds_up() {
    let mut config = AcquisitionConfig::DEFAULT;
    for samples in [1usize, 7, 8, 100, 1024, 8192, 110_000] {
        for _ in 0..6 {
            config = config.samples(samples);
            assert_eq!(
                config.pretrigger_samples() + config.posttrigger_samples(),
                samples
            );
            config.trigger.increment_pretrigger();
        }
        while config.trigger.decrement_pretrigger() > 0 {}
    }
}

#[test]
fn validation_rejects_out_of_range_values() {
    let config = AcquisitionConfig::DEFAULT;
    assert_eq!(config.validate(1024), Ok(()));
    assert_eq!(config.samples(0).validate(1024), Err(ConfigError::NoSamples));
    assert_eq!(
        config.samples(2048).validate(1024),
        Err(ConfigError::TooManySamples {
            requested: 2048,
            capacity: 1024
        })
    );
    assert_eq!(config.channels(0).validate(1024), Err(ConfigError::Channels(0)));
    assert_eq!(config.channels(5).validate(1024), Err(ConfigError::Channels(5)));

    let mut trigger = TriggerSettings::DEFAULT;
    trigger.set_channel(2);
    assert_eq!(
        config.channels(2).trigger(trigger).validate(1024),
        Err(ConfigError::TriggerChannel(2))
    );
}

#[test]
fn clamping_produces_a_valid_config() {
    let mut trigger = TriggerSettings::DEFAULT;
    trigger.set_channel(3);
    let config = AcquisitionConfig::DEFAULT
        .samples(200_000)
        .channels(9)
        .trigger(trigger)
        .clamped(110_000);
    assert_eq!(config.samples, 110_000);
    assert_eq!(config.channels, MAX_CHANNELS);
    assert_eq!(config.trigger.channel(), 3);
    assert_eq!(config.validate(110_000), Ok(()));

    let config = config.channels(0).clamped(16);
    assert_eq!(config.samples, 16);
    assert_eq!(config.channels, 1);
    assert_eq!(config.trigger.channel(), 0);
    assert_eq!(config.samples(0).clamped(16).samples, 1);
}

#[test]
fn width_is_applied_to_trigger() {
    let config = AcquisitionConfig::DEFAULT.sample_width(SampleWidth::U8);
    assert_eq!(config.trigger.initial_sample_value(), 0xFF);
    let config = config.trigger(TriggerSettings::DEFAULT);
    assert_eq!(config.trigger.initial_sample_value(), 0xFF);
}
