//! # Acquisition engine
//!
//! The engine runs alone on the acquisition core. It owns the sample buffer's writer (the two
//! chained DMA channels) and the ADC, and spends its life in [`Engine::run`]: pick up a command if
//! one is waiting, then look at the sample channel's transfer count.
//!
//! ## One capture
//!
//! A start command copies the published [`AcquisitionConfig`], arms both channels and starts the
//! converter. From then on the hardware fills the buffer on its own. Each poll compares the live
//! transfer count with the previous one and examines every sample written in between:
//!
//! - while no trigger has been seen and the pretrigger history is available (or the buffer has
//!   already wrapped), trigger-channel samples go through the edge comparator;
//! - on an edge, the engine works out where the window ends. If that point is still ahead in this
//!   pass the restart address is nulled, so the sample channel stops at the end of the buffer at
//!   the latest. Otherwise exactly one more pass is allowed and the window continues at the head;
//! - once the count reaches the end of the window, or the sample channel has stopped by itself,
//!   the capture is done. The window is published and [`Status::CaptureDone`] is sent.
//!
//! If an edge that needs a second pass is only found after the sample channel has stopped on a
//! null restart, the head of the buffer holds nothing after the trigger. The edge is dropped and
//! the capture is published untriggered.
//!
//! [`Command::StartContinuous`] also gives up after one window's worth of samples without a
//! trigger and publishes the head of the buffer. [`Command::StartSingleShot`] keeps the buffer
//! cycling until a trigger arrives or the controller sends [`Command::Stop`].

use crate::adc::{round_robin_divider, AdcControl, FifoConfig, InputMask};
use crate::buffer::SampleBuffer;
use crate::capture::{CaptureResult, Layout, TriggerPoint, Window};
use crate::chain::ChainState;
use crate::config::AcquisitionConfig;
use crate::dma::{ControlChannel, DmaChannel, Event, SampleChannel};
use crate::mailbox::{Command, Error, Fifo, FifoExt, Status};
use crate::snapshot::{Diagnostics, Handoff};
use crate::trigger::TriggerSettings;

/// Acquisition engine
///
/// `N` is the capacity of the sample buffer, `S` and `C` the sample and control DMA channels,
/// `A` the converter and `F` the engine's end of the mailbox.
pub struct Engine<'a, const N: usize, S, C, A, F> {
    buffer: &'a SampleBuffer<N>,
    chain: &'a ChainState,
    sample: S,
    control: C,
    adc: A,
    link: F,
    handoff: &'a Handoff,
    cycles: u32,
    capture: Option<Capture>,
}

impl<'a, const N: usize, S, C, A, F> Engine<'a, N, S, C, A, F>
where
    S: SampleChannel,
    C: ControlChannel,
    A: AdcControl,
    F: Fifo,
{
    pub fn new(
        buffer: &'a SampleBuffer<N>,
        chain: &'a ChainState,
        sample: S,
        control: C,
        adc: A,
        link: F,
        handoff: &'a Handoff,
    ) -> Self {
        Engine {
            buffer,
            chain,
            sample,
            control,
            adc,
            link,
            handoff,
            cycles: 0,
            capture: None,
        }
    }

    /// Configures both channels, resets the converter and tells the controller the engine is up
    ///
    /// The chain interrupt must be routed to [`chain::on_interrupt`](crate::chain::on_interrupt)
    /// before the first start command arrives.
    pub fn init(&mut self) {
        self.chain.arm(0, false);
        self.configure_channels();
        self.control.listen(Event::TransferComplete);

        self.adc.reset();
        self.adc.select_input(0);
        self.adc.set_round_robin(InputMask::empty());
        self.adc.set_clock_divider(AcquisitionConfig::DEFAULT.divider);

        self.handoff.diagnostics.publish(self.diagnostics(None, false));
        info!(
            "acquisition engine up: sample channel {}, control channel {}",
            self.sample.id(),
            self.control.id()
        );
        self.link.send(Status::EngineStarted);
    }

    /// Handles at most one command, then advances the capture in progress
    ///
    /// Returns an error if the mailbox delivers a word that is not a command.
    pub fn poll(&mut self) -> Result<(), Error> {
        if let Some(command) = self.link.try_receive::<Command>() {
            match command? {
                Command::StartContinuous => self.start(false),
                Command::StartSingleShot => self.start(true),
                Command::Stop => self.stop(),
            }
        }
        self.track();
        Ok(())
    }

    /// Polls forever
    ///
    /// # Panics
    ///
    /// Panics on a protocol violation: the hardware state is unknown at that point and the
    /// system has to be restarted.
    pub fn run(mut self) -> ! {
        loop {
            if let Err(error) = self.poll() {
                panic!("acquisition protocol violation: {:?}", error);
            }
        }
    }

    /// Returns `true` while a capture is in progress
    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Stops acquisition and gives the hardware back
    pub fn release(mut self) -> (S, C, A, F) {
        self.halt();
        self.control.unlisten(Event::TransferComplete);
        (self.sample, self.control, self.adc, self.link)
    }

    fn start(&mut self, single_shot: bool) {
        if self.capture.is_some() {
            self.halt();
        }
        self.adc.reset();

        let config = self.handoff.config.read();
        self.cycles = self.cycles.wrapping_add(1);
        let capture = Capture::new(&config, N, self.cycles);

        self.adc.set_clock_divider(config.divider);
        self.adc.set_round_robin(InputMask::round_robin(config.channels));
        self.adc.select_input(0);

        self.configure_channels();
        if single_shot {
            self.chain.arm(self.buffer.address(), true);
        } else {
            self.chain.arm(0, false);
        }

        debug!(
            "start #{}: {} samples ({} before trigger), {} channels, single shot {}",
            self.cycles,
            config.samples,
            capture.window.pretrigger,
            config.channels,
            single_shot
        );
        self.handoff
            .diagnostics
            .publish(self.diagnostics(Some(&capture), true));
        self.capture = Some(capture);

        self.adc.configure_fifo(FifoConfig::for_width(config.width));
        self.sample.start();
        self.adc.run(true);
    }

    fn stop(&mut self) {
        self.halt();
        if let Some(capture) = self.capture.take() {
            debug!("stop #{} after {} passes", capture.cycle, capture.passes);
        }
        self.handoff.diagnostics.publish(self.diagnostics(None, false));
    }

    /// Follows the transfer count and finishes the capture when the window is complete
    fn track(&mut self) {
        let capture = match self.capture.as_mut() {
            Some(capture) => capture,
            None => return,
        };

        let stopped = has_stopped(&self.sample);
        let count = if stopped {
            0
        } else {
            self.sample.transfer_count() as usize
        };

        let searching = capture.phase == Phase::Searching;
        let auto_stopped =
            count != capture.count && capture.advance(count, self.buffer, self.chain);

        // The restart address went in after the channel had already stopped, so the head of
        // the buffer never received the rest of the window.
        if searching && capture.phase == Phase::WrapPending && has_stopped(&self.sample) {
            warn!(
                "capture #{}: trigger at {} came too late for a second pass",
                capture.cycle,
                capture.trigger_index
            );
            capture.drop_trigger();
            self.finish(false);
        } else if auto_stopped || stopped {
            self.finish(auto_stopped);
        }
    }

    fn finish(&mut self, auto_stopped: bool) {
        self.halt();
        let mut capture = match self.capture.take() {
            Some(capture) => capture,
            None => return,
        };
        capture.auto_stopped = auto_stopped;

        let result = capture.result();
        debug!(
            "capture #{} done: {}, trigger at {}",
            capture.cycle,
            result.layout,
            capture.trigger_index
        );

        self.handoff.result.publish(result);
        self.handoff
            .diagnostics
            .publish(self.diagnostics(Some(&capture), false));
        self.link.send(Status::CaptureDone);
    }

    /// Stops the writer: no re-arm, no conversions, no transfer
    fn halt(&mut self) {
        self.chain.disarm();
        self.adc.run(false);
        self.sample.abort();
    }

    fn configure_channels(&mut self) {
        self.sample
            .configure(self.buffer.address(), N as u32, self.control.id());
        self.control
            .configure(self.sample.restart_register(), self.chain.slot_address());
    }

    fn diagnostics(&self, capture: Option<&Capture>, running: bool) -> Diagnostics {
        let mut diagnostics = Diagnostics {
            running,
            sample_channel: self.sample.id(),
            control_channel: self.control.id(),
            ..Diagnostics::CLEARED
        };
        if let Some(capture) = capture {
            diagnostics.triggered = capture.phase != Phase::Searching;
            diagnostics.auto_stopped = capture.auto_stopped;
            diagnostics.second_cycle = capture.second_cycle;
            diagnostics.trigger_index = capture.trigger_index;
            diagnostics.passes = capture.passes;
        }
        diagnostics
    }
}

/// A channel stopped by a null restart has written its whole pass
fn has_stopped<S: SampleChannel>(sample: &S) -> bool {
    !sample.is_busy() && sample.write_address() == 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Looking for an edge
    Searching,
    /// Edge found; the window continues after the next wrap
    WrapPending,
    /// Edge found; waiting for the end of the window
    Triggered,
}

/// State of one capture, rebuilt on every start command
struct Capture {
    cycle: u32,
    window: Window,
    trigger: TriggerSettings,
    channels: usize,
    trigger_channel: usize,
    /// Transfer count at which the capture is complete
    end_count: usize,
    /// Transfer count below which the pretrigger history is in the buffer
    pretrigger_count: usize,
    /// Transfer count seen by the previous poll
    count: usize,
    /// Next buffer index to examine in this pass
    scanned: usize,
    /// Input converted into buffer index 0 in this pass
    origin: usize,
    passes: u32,
    phase: Phase,
    previous: u16,
    trigger_index: usize,
    trigger_origin: usize,
    second_cycle: usize,
    auto_stopped: bool,
}

impl Capture {
    fn new(config: &AcquisitionConfig, capacity: usize, cycle: u32) -> Self {
        let pretrigger = config.pretrigger_samples();
        let window = Window {
            capacity,
            pretrigger,
            posttrigger: config.posttrigger_samples(),
        };

        Capture {
            cycle,
            window,
            trigger: config.trigger,
            channels: round_robin_divider(config.channels),
            trigger_channel: config.trigger.channel() as usize,
            end_count: capacity.saturating_sub(config.samples),
            pretrigger_count: capacity.saturating_sub(pretrigger),
            count: capacity,
            scanned: 0,
            origin: 0,
            passes: 0,
            phase: Phase::Searching,
            previous: config.trigger.initial_sample_value(),
            trigger_index: 0,
            trigger_origin: 0,
            second_cycle: 0,
            auto_stopped: false,
        }
    }

    /// Examines the samples written since the last poll. Returns `true` once the window is
    /// complete.
    ///
    /// The engine has to poll at least once per pass. After a wrap the rest of the old pass is
    /// scanned first, and any of it the new pass has already overwritten is read as new data;
    /// an edge found there is displaced by at most the samples written since the wrap.
    fn advance<const N: usize>(
        &mut self,
        count: usize,
        buffer: &SampleBuffer<N>,
        chain: &ChainState,
    ) -> bool {
        if count > self.count {
            // the channel re-armed: finish the old pass before starting on the new one
            if self.scan(0, buffer, chain) {
                return true;
            }
            self.wrap();
        }
        self.count = count;
        self.scan(count, buffer, chain)
    }

    fn wrap(&mut self) {
        self.passes += 1;
        self.origin = (self.origin + self.window.capacity % self.channels) % self.channels;
        self.scanned = 0;
        if self.phase == Phase::WrapPending {
            self.phase = Phase::Triggered;
        }
        trace!("wrap {}", self.passes);
    }

    /// Steps through every sample up to transfer count `count`
    fn scan<const N: usize>(
        &mut self,
        count: usize,
        buffer: &SampleBuffer<N>,
        chain: &ChainState,
    ) -> bool {
        let written = N.saturating_sub(count);
        while self.scanned < written {
            let index = self.scanned;
            self.scanned += 1;
            if self.step(index, buffer, chain) {
                return true;
            }
        }
        false
    }

    fn step<const N: usize>(
        &mut self,
        index: usize,
        buffer: &SampleBuffer<N>,
        chain: &ChainState,
    ) -> bool {
        // transfer count right after `index` was written
        let remaining = N - index - 1;

        let auto_stop = !chain.cycles_forever() && self.phase != Phase::WrapPending;
        if auto_stop && remaining <= self.end_count {
            return true;
        }

        let window_open = remaining < self.pretrigger_count || chain.has_chained();
        if self.phase == Phase::Searching && window_open && self.is_trigger_channel(index) {
            let sample = buffer.read(index);
            if self.trigger.detect_edge(self.previous, sample) {
                self.on_trigger(index, remaining, buffer.address(), chain);
            }
            self.previous = sample;
        }
        false
    }

    fn on_trigger(&mut self, index: usize, remaining: usize, base: usize, chain: &ChainState) {
        let posttrigger = self.window.posttrigger;
        chain.set_cycle_forever(false);
        if remaining < posttrigger {
            self.second_cycle = posttrigger - remaining;
            self.end_count = self.window.capacity - self.second_cycle;
            self.phase = Phase::WrapPending;
            chain.set_restart_address(base);
        } else {
            self.end_count = remaining - posttrigger;
            self.phase = Phase::Triggered;
            chain.disarm();
        }
        self.trigger_index = index;
        self.trigger_origin = self.origin;
        debug!(
            "trigger at {} in pass {}, {} samples after the wrap",
            index,
            self.passes,
            self.second_cycle
        );
    }

    /// Falls back to the untriggered head of the buffer
    fn drop_trigger(&mut self) {
        self.phase = Phase::Searching;
        self.trigger_index = 0;
        self.trigger_origin = 0;
        self.second_cycle = 0;
    }

    fn is_trigger_channel(&self, index: usize) -> bool {
        (self.origin + index) % self.channels == self.trigger_channel
    }

    fn result(&self) -> CaptureResult {
        let trigger = match self.phase {
            Phase::Searching => None,
            Phase::WrapPending | Phase::Triggered => Some(TriggerPoint {
                index: self.trigger_index,
                second_cycle: self.second_cycle,
            }),
        };
        let layout = self.window.layout(trigger);

        CaptureResult {
            layout,
            first_channel: self.first_channel(&layout),
            channels: self.channels as u8,
            cycle: self.cycle,
        }
    }

    /// Input of the first sample in the window
    fn first_channel(&self, layout: &Layout) -> u8 {
        let n = self.channels;
        let shift = self.window.capacity % n;
        let channel = match *layout {
            Layout::Untriggered { .. } => self.origin,
            Layout::Contiguous { start, .. } => self.trigger_origin + start,
            Layout::ForwardWrap { tail_start, .. } => self.trigger_origin + tail_start,
            // the tail was written in the pass before the trigger's
            Layout::BackwardWrap { tail_start, .. } => {
                self.trigger_origin + n - shift + tail_start
            }
        };
        (channel % n) as u8
    }
}

#[cfg(test)]
fn window_capture(samples: usize, channels: u8) -> Capture {
    let config = AcquisitionConfig::DEFAULT.samples(samples).channels(channels);
    Capture::new(&config, 16, 1)
}

#[test]
fn capture_thresholds_follow_the_window() {
    let mut config = AcquisitionConfig::DEFAULT.samples(8);
    config.trigger.increment_pretrigger();
    let capture = Capture::new(&config, 16, 1);
    assert_eq!(capture.window.pretrigger, 3);
    assert_eq!(capture.window.posttrigger, 5);
    assert_eq!(capture.end_count, 8);
    assert_eq!(capture.pretrigger_count, 13);
    assert_eq!(capture.count, 16);
    assert_eq!(capture.previous, config.trigger.initial_sample_value());
}

#[test]
fn trigger_channel_follows_stream_position() {
    let mut capture = window_capture(8, 2);
    let tested: [bool; 4] = core::array::from_fn(|i| capture.is_trigger_channel(i));
    assert_eq!(tested, [true, false, true, false]);

    // an odd capacity flips the phase of every other pass
    capture.window.capacity = 15;
    capture.wrap();
    assert_eq!(capture.origin, 1);
    assert!(!capture.is_trigger_channel(0));
    assert!(capture.is_trigger_channel(1));
    capture.wrap();
    assert_eq!(capture.origin, 0);
    assert_eq!(capture.passes, 2);
}

#[test]
fn first_channel_tracks_the_window_start() {
    let mut capture = window_capture(8, 2);
    capture.phase = Phase::Triggered;

    capture.trigger_index = 5;
    let result = capture.result();
    assert_eq!(result.layout.segments().0.start, 5 - capture.window.pretrigger);
    assert_eq!(result.first_channel, (result.layout.segments().0.start % 2) as u8);

    capture.window.capacity = 15;
    capture.trigger_origin = 1;
    capture.trigger_index = 0;
    let result = capture.result();
    assert!(matches!(result.layout, Layout::BackwardWrap { .. }));
    // the tail starts at 15 - pretrigger and was written with origin 0
    let tail_start = result.layout.segments().0.start;
    assert_eq!(result.first_channel, (tail_start % 2) as u8);
}
