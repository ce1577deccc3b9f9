//! # Trigger settings
//!
//! Threshold, edge polarity, pretrigger fraction and trigger channel, plus the pure edge
//! comparator the engine runs on every trigger-channel sample.
//!
//! The level is kept in millivolts and converted to raw ADC counts for the current
//! [`SampleWidth`] whenever it changes, so the engine only ever compares integers.
//!
//! ```rust
//! use scope_acquisition::trigger::{Edge, TriggerSettings};
//!
//! let mut trigger = TriggerSettings::DEFAULT;
//! trigger.set_edge(Edge::Falling);
//! trigger.increment_level();
//!
//! assert_eq!(trigger.level_millivolts(), 1000);
//! assert!(trigger.detect_edge(2000, 1000));
//! ```

use crate::config::MAX_CHANNELS;

/// Full-scale input voltage of the ADC.
pub const FULL_SCALE_MV: u16 = 3300;
/// Highest selectable trigger level
pub const MAX_LEVEL_MV: u16 = 3200;
/// Lowest selectable trigger level
pub const MIN_LEVEL_MV: u16 = 100;
/// Step used by [`TriggerSettings::increment_level`] and [`TriggerSettings::decrement_level`]
pub const COARSE_STEP_MV: u16 = 500;
/// Step used by the `_fine` level adjustments
pub const FINE_STEP_MV: u16 = 100;

pub const MAX_PRETRIGGER: u8 = 80;
pub const MIN_PRETRIGGER: u8 = 0;
pub const PRETRIGGER_STEP: u8 = 20;

const MIN_RAW: u16 = 0;

/// Trigger edge polarity
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// Trigger when the signal crosses the level going up
    Rising,
    /// Trigger when the signal crosses the level going down
    Falling,
}

impl Edge {
    /// Pure edge comparator.
    ///
    /// Rising: `before < threshold <= after`. Falling: `before > threshold >= after`.
    #[inline]
    pub const fn detect(self, threshold: u16, before: u16, after: u16) -> bool {
        match self {
            Edge::Rising => before < threshold && after >= threshold,
            Edge::Falling => before > threshold && after <= threshold,
        }
    }
}

/// Resolution of the words the ADC pushes into its FIFO
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleWidth {
    /// 8-bit samples (FIFO byte shift enabled)
    U8,
    /// Native 12-bit samples
    U12,
}

impl SampleWidth {
    /// Largest raw value a sample of this width can take
    pub const fn max_raw(self) -> u16 {
        match self {
            SampleWidth::U8 => 0xFF,
            SampleWidth::U12 => 0xFFF,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            SampleWidth::U8 => 8,
            SampleWidth::U12 => 12,
        }
    }
}

impl Default for SampleWidth {
    fn default() -> Self {
        SampleWidth::U12
    }
}

/// User-facing trigger mode
///
/// The session controller maps each mode onto one of its states.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerMode {
    /// Free running: a capture completes on a trigger or after one full window without one
    Auto = 0,
    /// Repeated single shot: every capture waits for a trigger
    Normal = 1,
    /// One single shot, then hold
    Wait = 2,
    /// Acquisition stopped, last capture kept
    Hold = 3,
}

impl TryFrom<u8> for TriggerMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TriggerMode::Auto),
            1 => Ok(TriggerMode::Normal),
            2 => Ok(TriggerMode::Wait),
            3 => Ok(TriggerMode::Hold),
            other => Err(other),
        }
    }
}

/// Trigger configuration
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerSettings {
    max_raw: u16,
    level_mv: u16,
    level_raw: u16,
    pretrigger: u8,
    edge: Edge,
    channel: u8,
}

impl TriggerSettings {
    /// 500 mV rising edge on channel 0 with 20 % pretrigger, 12-bit samples
    pub const DEFAULT: Self = Self::new(SampleWidth::U12);

    pub const fn new(width: SampleWidth) -> Self {
        let max_raw = width.max_raw();
        let level_mv = 500;
        Self {
            max_raw,
            level_mv,
            level_raw: raw_level(max_raw, level_mv),
            pretrigger: 20,
            edge: Edge::Rising,
            channel: 0,
        }
    }

    pub fn set_edge(&mut self, edge: Edge) {
        self.edge = edge;
    }

    pub fn edge(&self) -> Edge {
        self.edge
    }

    /// Trigger level in volts, for display
    pub fn level(&self) -> f32 {
        self.level_mv as f32 / 1000.0
    }

    pub fn level_millivolts(&self) -> u16 {
        self.level_mv
    }

    /// Trigger threshold in raw ADC counts
    pub fn level_raw(&self) -> u16 {
        self.level_raw
    }

    /// Raises the level by `step` mV, snapping down to a multiple of `step`, clamped to
    /// [`MAX_LEVEL_MV`].
    pub fn increment_level_by(&mut self, step: u16) {
        let mut level = self.level_mv;
        if step >= MAX_LEVEL_MV || MAX_LEVEL_MV - step < level {
            level = MAX_LEVEL_MV;
        } else if step > 0 {
            level = (level + step) - (level % step);
        }
        self.level_mv = level.min(MAX_LEVEL_MV);
        self.update_raw_level();
    }

    /// Lowers the level by `step` mV, snapping to a multiple of `step`, clamped to
    /// [`MIN_LEVEL_MV`].
    pub fn decrement_level_by(&mut self, step: u16) {
        let mut level = self.level_mv;
        if step >= MAX_LEVEL_MV || MIN_LEVEL_MV + step > level {
            level = MIN_LEVEL_MV;
        } else if step > 0 {
            if level % step == 0 {
                level -= step;
            } else {
                level -= level % step;
            }
        }
        self.level_mv = level.max(MIN_LEVEL_MV);
        self.update_raw_level();
    }

    pub fn increment_level(&mut self) {
        self.increment_level_by(COARSE_STEP_MV);
    }

    pub fn decrement_level(&mut self) {
        self.decrement_level_by(COARSE_STEP_MV);
    }

    pub fn increment_level_fine(&mut self) {
        self.increment_level_by(FINE_STEP_MV);
    }

    pub fn decrement_level_fine(&mut self) {
        self.decrement_level_by(FINE_STEP_MV);
    }

    /// Steps the pretrigger up by [`PRETRIGGER_STEP`] percent and returns the new value
    pub fn increment_pretrigger(&mut self) -> u8 {
        if self.pretrigger < MAX_PRETRIGGER {
            self.pretrigger += PRETRIGGER_STEP;
        }
        self.pretrigger
    }

    /// Steps the pretrigger down by [`PRETRIGGER_STEP`] percent and returns the new value
    pub fn decrement_pretrigger(&mut self) -> u8 {
        if self.pretrigger > MIN_PRETRIGGER {
            self.pretrigger -= PRETRIGGER_STEP;
        }
        self.pretrigger
    }

    /// Pretrigger fraction in percent
    pub fn pretrigger(&self) -> u8 {
        self.pretrigger
    }

    /// Number of samples of a `total`-sample window that precede the trigger
    pub fn pretrigger_count(&self, total: usize) -> usize {
        total * self.pretrigger as usize / 100
    }

    pub fn detect_edge(&self, before: u16, after: u16) -> bool {
        self.edge.detect(self.level_raw, before, after)
    }

    /// Comparator seed for the start of a capture
    ///
    /// Full scale for a rising edge and zero for a falling one, so the first real sample can
    /// never complete an edge on its own.
    pub fn initial_sample_value(&self) -> u16 {
        match self.edge {
            Edge::Rising => self.max_raw,
            Edge::Falling => MIN_RAW,
        }
    }

    pub fn set_sample_width(&mut self, width: SampleWidth) {
        self.max_raw = width.max_raw();
        self.update_raw_level();
    }

    /// Selects the channel whose samples are compared. Out-of-range channels are ignored.
    pub fn set_channel(&mut self, channel: u8) {
        if channel < MAX_CHANNELS {
            self.channel = channel;
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn update_raw_level(&mut self) {
        self.level_raw = raw_level(self.max_raw, self.level_mv);
    }
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `round(max_raw * millivolts / FULL_SCALE_MV)`
const fn raw_level(max_raw: u16, millivolts: u16) -> u16 {
    let full_scale = FULL_SCALE_MV as u32;
    ((max_raw as u32 * millivolts as u32 + full_scale / 2) / full_scale) as u16
}

#[test]
fn rising_edge_crosses_threshold_only_going_up() {
    let t = 100;
    assert!(Edge::Rising.detect(t, 99, 100));
    assert!(Edge::Rising.detect(t, 0, 4095));
    assert!(!Edge::Rising.detect(t, 100, 101));
    assert!(!Edge::Rising.detect(t, 101, 99));
    assert!(!Edge::Rising.detect(t, 10, 20));
    assert!(!Edge::Rising.detect(t, 200, 300));
}

#[test]
fn falling_edge_crosses_threshold_only_going_down() {
    let t = 100;
    assert!(Edge::Falling.detect(t, 101, 100));
    assert!(Edge::Falling.detect(t, 4095, 0));
    assert!(!Edge::Falling.detect(t, 100, 99));
    assert!(!Edge::Falling.detect(t, 99, 101));
    assert!(!Edge::Falling.detect(t, 300, 200));
    assert!(!Edge::Falling.detect(t, 20, 10));
}

#[test]
fn edge_comparator_is_exhaustive_over_small_range() {
    for t in 0..8u16 {
        for a in 0..8u16 {
            for b in 0..8u16 {
                assert_eq!(Edge::Rising.detect(t, a, b), a < t && t <= b);
                assert_eq!(Edge::Falling.detect(t, a, b), a > t && t >= b);
            }
        }
    }
}

#[test]
fn raw_level_is_rounded() {
    let trigger = TriggerSettings::DEFAULT;
    // 4095 * 500 / 3300 = 620.45
    assert_eq!(trigger.level_raw(), 620);
    // 4095 * 1650 / 3300 = 2047.5
    assert_eq!(raw_level(0xFFF, 1650), 2048);
    assert_eq!(raw_level(0xFFF, 3300), 0xFFF);
    assert_eq!(raw_level(0xFF, 3300), 0xFF);
    assert_eq!(raw_level(0xFFF, 0), 0);
}

#[test]
fn coarse_level_steps_snap_and_clamp() {
    let mut trigger = TriggerSettings::DEFAULT;
    trigger.increment_level();
    assert_eq!(trigger.level_millivolts(), 1000);

    trigger.increment_level_fine();
    assert_eq!(trigger.level_millivolts(), 1100);
    trigger.increment_level();
    assert_eq!(trigger.level_millivolts(), 1500);
    trigger.decrement_level_fine();
    trigger.decrement_level_fine();
    assert_eq!(trigger.level_millivolts(), 1300);
    trigger.decrement_level();
    assert_eq!(trigger.level_millivolts(), 1000);

    for _ in 0..20 {
        trigger.increment_level();
    }
    assert_eq!(trigger.level_millivolts(), MAX_LEVEL_MV);
    for _ in 0..40 {
        trigger.decrement_level();
    }
    assert_eq!(trigger.level_millivolts(), MIN_LEVEL_MV);
    assert_eq!(trigger.level_raw(), raw_level(0xFFF, MIN_LEVEL_MV));
}

#[test]
fn pretrigger_steps_are_clamped() {
    let mut trigger = TriggerSettings::DEFAULT;
    assert_eq!(trigger.pretrigger(), 20);
    assert_eq!(trigger.decrement_pretrigger(), 0);
    assert_eq!(trigger.decrement_pretrigger(), 0);
    for _ in 0..10 {
        trigger.increment_pretrigger();
    }
    assert_eq!(trigger.pretrigger(), MAX_PRETRIGGER);
}

#[test]
fn pretrigger_count_truncates() {
    let mut trigger = TriggerSettings::DEFAULT;
    assert_eq!(trigger.pretrigger_count(1024), 204);
    trigger.increment_pretrigger();
    assert_eq!(trigger.pretrigger_count(8), 3);
    assert_eq!(trigger.pretrigger_count(0), 0);
}

#[test]
fn comparator_seed_follows_edge_and_width() {
    let mut trigger = TriggerSettings::DEFAULT;
    assert_eq!(trigger.initial_sample_value(), 0xFFF);
    // a seeded comparator never fires on the first sample
    assert!(!trigger.detect_edge(trigger.initial_sample_value(), 0xFFF));

    trigger.set_edge(Edge::Falling);
    assert_eq!(trigger.initial_sample_value(), 0);
    assert!(!trigger.detect_edge(trigger.initial_sample_value(), 0));

    trigger.set_edge(Edge::Rising);
    trigger.set_sample_width(SampleWidth::U8);
    assert_eq!(trigger.initial_sample_value(), 0xFF);
    assert_eq!(trigger.level_raw(), 39);
}

#[test]
fn trigger_channel_out_of_range_is_ignored() {
    let mut trigger = TriggerSettings::DEFAULT;
    trigger.set_channel(1);
    assert_eq!(trigger.channel(), 1);
    trigger.set_channel(MAX_CHANNELS);
    assert_eq!(trigger.channel(), 1);
}
