//! # Capture windows
//!
//! When a capture completes, the engine knows where the trigger landed in the circular buffer
//! and whether the buffer wrapped on either side of it. [`Window::layout`] turns that into a
//! [`Layout`]: the window is always one or two contiguous stretches of the buffer, and reading
//! the first stretch followed by the second yields the samples in the order they were taken.
//!
//! ```text
//!                0                                      N
//! Contiguous     |      [ pre  T  post ]                |
//! ForwardWrap    | post ]                [ pre  T  post |
//! BackwardWrap   | pre  T  post ]                 [ pre |
//! ```

use core::ops::Range;

use crate::buffer::SampleBuffer;

/// Where the samples of one capture are in the buffer
///
/// Exactly one shape is produced per completed capture. The two wrapped shapes both start in
/// the tail of the buffer and continue at its head.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// No trigger was found; the window is the head of the buffer
    Untriggered { length: usize },
    /// The whole window lies between the buffer ends
    Contiguous {
        start: usize,
        length: usize,
        trigger_index: usize,
    },
    /// The trigger came too late for the post-trigger samples to fit; they continue at the head
    ForwardWrap {
        tail_start: usize,
        tail_length: usize,
        head_length: usize,
        trigger_index: usize,
    },
    /// The trigger came too early for the pre-trigger samples to fit; they start in the tail,
    /// left over from the previous pass
    BackwardWrap {
        tail_start: usize,
        tail_length: usize,
        head_length: usize,
        trigger_index: usize,
    },
}

impl Layout {
    /// Buffer ranges of the first and second segment; the second is empty unless wrapped
    pub fn segments(&self) -> (Range<usize>, Range<usize>) {
        match *self {
            Layout::Untriggered { length } => (0..length, 0..0),
            Layout::Contiguous { start, length, .. } => (start..start + length, 0..0),
            Layout::ForwardWrap {
                tail_start,
                tail_length,
                head_length,
                ..
            }
            | Layout::BackwardWrap {
                tail_start,
                tail_length,
                head_length,
                ..
            } => (tail_start..tail_start + tail_length, 0..head_length),
        }
    }

    /// Total number of samples in the window
    pub fn len(&self) -> usize {
        let (first, second) = self.segments();
        first.len() + second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the trigger instant within the reassembled window; 0 when untriggered
    pub fn trigger_index(&self) -> usize {
        match *self {
            Layout::Untriggered { .. } => 0,
            Layout::Contiguous { trigger_index, .. }
            | Layout::ForwardWrap { trigger_index, .. }
            | Layout::BackwardWrap { trigger_index, .. } => trigger_index,
        }
    }

    pub fn is_triggered(&self) -> bool {
        !matches!(self, Layout::Untriggered { .. })
    }

    /// Returns `true` if the window is split across the end of the buffer
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Layout::ForwardWrap { .. } | Layout::BackwardWrap { .. })
    }
}

/// What the engine publishes when a capture completes
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureResult {
    pub layout: Layout,
    /// Input the first sample of the window was converted from
    pub first_channel: u8,
    /// Number of interleaved inputs
    pub channels: u8,
    /// Number of the start command this capture answers, counted from 1 and wrapping
    pub cycle: u32,
}

impl CaptureResult {
    /// Placeholder published before the first capture
    pub const EMPTY: Self = CaptureResult {
        layout: Layout::Untriggered { length: 0 },
        first_channel: 0,
        channels: 1,
        cycle: 0,
    };
}

/// Size of a capture window in a buffer of `capacity` words
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub capacity: usize,
    pub pretrigger: usize,
    pub posttrigger: usize,
}

/// Where a trigger was found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerPoint {
    /// Buffer index of the sample that completed the edge
    pub index: usize,
    /// Samples still needed after the buffer wrapped; 0 if the window fit in one pass
    pub second_cycle: usize,
}

impl Window {
    pub fn samples(&self) -> usize {
        self.pretrigger + self.posttrigger
    }

    /// Shape of the window for a capture that ended with `trigger`
    pub fn layout(&self, trigger: Option<TriggerPoint>) -> Layout {
        let total = self.samples();
        let trigger_index = self.pretrigger;

        match trigger {
            None => Layout::Untriggered { length: total },
            Some(TriggerPoint { index, .. }) if index < self.pretrigger => {
                let missing = self.pretrigger - index;
                Layout::BackwardWrap {
                    tail_start: self.capacity - missing,
                    tail_length: missing,
                    head_length: total - missing,
                    trigger_index,
                }
            }
            Some(TriggerPoint {
                index,
                second_cycle: 0,
            }) => Layout::Contiguous {
                start: index - self.pretrigger,
                length: total,
                trigger_index,
            },
            Some(TriggerPoint { second_cycle, .. }) => {
                let first_cycle = total - second_cycle;
                Layout::ForwardWrap {
                    tail_start: self.capacity - first_cycle,
                    tail_length: first_cycle,
                    head_length: second_cycle,
                    trigger_index,
                }
            }
        }
    }
}

/// Read access to a published capture
///
/// Only handed out while the engine is idle, so the samples cannot change under the reader.
pub struct CaptureView<'a, const N: usize> {
    buffer: &'a SampleBuffer<N>,
    result: CaptureResult,
}

impl<'a, const N: usize> CaptureView<'a, N> {
    /// # Safety
    ///
    /// No DMA transfer may write into `buffer` while the view exists.
    pub(crate) unsafe fn new(buffer: &'a SampleBuffer<N>, result: CaptureResult) -> Self {
        CaptureView { buffer, result }
    }

    pub fn result(&self) -> &CaptureResult {
        &self.result
    }

    /// The two stretches of the buffer making up the window
    pub fn segments(&self) -> (&[u16], &[u16]) {
        let (first, second) = self.result.layout.segments();
        // NOTE(unsafe) the writer is stopped for the lifetime of the view
        unsafe {
            (
                self.buffer.slice(bounded(first, N)),
                self.buffer.slice(bounded(second, N)),
            )
        }
    }

    /// All samples of the window in acquisition order
    pub fn samples(&self) -> impl Iterator<Item = u16> + '_ {
        let (first, second) = self.segments();
        first.iter().chain(second).copied()
    }

    pub fn len(&self) -> usize {
        let (first, second) = self.segments();
        first.len() + second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn trigger_index(&self) -> usize {
        self.result.layout.trigger_index()
    }

    pub fn channels(&self) -> u8 {
        self.result.channels.max(1)
    }

    /// Trigger position counted in samples of a single input
    pub fn trigger_index_per_channel(&self) -> usize {
        self.trigger_index() / self.channels() as usize
    }

    /// Inputs in the order they appear in the window
    pub fn channel_order(&self) -> impl Iterator<Item = u8> {
        let channels = self.channels();
        let first = self.result.first_channel % channels;
        (0..channels).map(move |i| (first + i) % channels)
    }

    /// Samples converted from `input`, de-interleaved
    ///
    /// Empty if `input` is not one of the captured inputs.
    pub fn channel(&self, input: u8) -> impl Iterator<Item = u16> + '_ {
        let channels = self.channels();
        let first = self.result.first_channel % channels;
        let offset = if input < channels {
            ((input + channels - first) % channels) as usize
        } else {
            self.len()
        };
        self.samples().skip(offset).step_by(channels as usize)
    }
}

fn bounded(range: Range<usize>, capacity: usize) -> Range<usize> {
    let end = range.end.min(capacity);
    range.start.min(end)..end
}

#[cfg(test)]
const WINDOW: Window = Window {
    capacity: 16,
    pretrigger: 2,
    posttrigger: 6,
};

#[test]
fn trigger_with_history_is_contiguous() {
    let layout = WINDOW.layout(Some(TriggerPoint {
        index: 5,
        second_cycle: 0,
    }));
    assert_eq!(
        layout,
        Layout::Contiguous {
            start: 3,
            length: 8,
            trigger_index: 2
        }
    );
    assert_eq!(layout.segments(), (3..11, 0..0));
}

#[test]
fn early_trigger_takes_history_from_the_tail() {
    let layout = WINDOW.layout(Some(TriggerPoint {
        index: 1,
        second_cycle: 0,
    }));
    assert_eq!(
        layout,
        Layout::BackwardWrap {
            tail_start: 15,
            tail_length: 1,
            head_length: 7,
            trigger_index: 2
        }
    );
    assert_eq!(layout.segments(), (15..16, 0..7));
    assert_eq!(layout.len(), 8);
}

#[test]
fn late_trigger_continues_at_the_head() {
    // index 12 leaves 3 samples in the pass, 3 more are taken after the wrap
    let layout = WINDOW.layout(Some(TriggerPoint {
        index: 12,
        second_cycle: 3,
    }));
    assert_eq!(
        layout,
        Layout::ForwardWrap {
            tail_start: 11,
            tail_length: 5,
            head_length: 3,
            trigger_index: 2
        }
    );
    assert!(layout.is_wrapped());
    assert_eq!(layout.len(), 8);
}

#[test]
fn missing_trigger_falls_back_to_the_head() {
    let layout = WINDOW.layout(None);
    assert_eq!(layout, Layout::Untriggered { length: 8 });
    assert_eq!(layout.trigger_index(), 0);
    assert!(!layout.is_triggered());
    assert_eq!(layout.segments(), (0..8, 0..0));
}

#[test]
fn every_trigger_position_gives_one_full_window() {
    for index in 0..16 {
        let remaining = 16 - index - 1;
        let second_cycle = WINDOW.posttrigger.saturating_sub(remaining);
        let layout = WINDOW.layout(Some(TriggerPoint {
            index,
            second_cycle,
        }));
        assert_eq!(layout.len(), 8);
        assert_eq!(layout.trigger_index(), 2);
        let (first, second) = layout.segments();
        assert!(first.end <= 16 && second.end <= 16);
        assert_eq!(layout, WINDOW.layout(Some(TriggerPoint { index, second_cycle })));
    }
}

#[test]
fn view_reassembles_and_deinterleaves() {
    let buffer: &'static SampleBuffer<16> =
        std::boxed::Box::leak(std::boxed::Box::new(SampleBuffer::new()));
    for i in 0..16 {
        unsafe { buffer.as_mut_ptr().add(i).write_volatile(i as u16) };
    }

    let result = CaptureResult {
        layout: WINDOW.layout(Some(TriggerPoint {
            index: 1,
            second_cycle: 0,
        })),
        first_channel: 1,
        channels: 2,
        cycle: 1,
    };
    let view = unsafe { CaptureView::new(buffer, result) };

    let samples: std::vec::Vec<u16> = view.samples().collect();
    assert_eq!(samples, [15, 0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(view.len(), 8);
    assert_eq!(view.trigger_index_per_channel(), 1);

    let order: std::vec::Vec<u8> = view.channel_order().collect();
    assert_eq!(order, [1, 0]);
    let ch0: std::vec::Vec<u16> = view.channel(0).collect();
    let ch1: std::vec::Vec<u16> = view.channel(1).collect();
    assert_eq!(ch0, [0, 2, 4, 6]);
    assert_eq!(ch1, [15, 1, 3, 5]);
    assert_eq!(view.channel(2).count(), 0);
}

#[test]
fn view_clamps_out_of_range_layouts() {
    let buffer: &'static SampleBuffer<16> =
        std::boxed::Box::leak(std::boxed::Box::new(SampleBuffer::new()));
    let result = CaptureResult {
        layout: Layout::Untriggered { length: 40 },
        ..CaptureResult::EMPTY
    };
    let view = unsafe { CaptureView::new(buffer, result) };
    assert_eq!(view.len(), 16);
    assert_eq!(view.trigger_index(), 0);
}
