//! # Snapshots shared between the cores
//!
//! A [`Snapshot`] is a small `Copy` record behind a critical-section mutex. Writers replace the
//! whole record and readers copy the whole record out, so neither side ever holds a reference
//! into shared memory and the lock is held only for the duration of one copy.

use core::cell::Cell;

use critical_section::Mutex;

use crate::capture::CaptureResult;
use crate::config::AcquisitionConfig;

/// Copy-in/copy-out cell guarded by a critical section
pub struct Snapshot<T: Copy> {
    cell: Mutex<Cell<T>>,
}

impl<T: Copy> Snapshot<T> {
    pub const fn new(value: T) -> Self {
        Snapshot {
            cell: Mutex::new(Cell::new(value)),
        }
    }

    /// Replaces the shared record
    pub fn publish(&self, value: T) {
        critical_section::with(|cs| self.cell.borrow(cs).set(value));
    }

    /// Copies the shared record out
    pub fn read(&self) -> T {
        critical_section::with(|cs| self.cell.borrow(cs).get())
    }

    /// Read-modify-write under a single lock
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.cell.borrow(cs);
            let mut value = cell.get();
            let ret = f(&mut value);
            cell.set(value);
            ret
        })
    }
}

/// Engine bookkeeping exposed for debugging
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// A capture is in progress
    pub running: bool,
    pub triggered: bool,
    /// The last capture ended on the end-of-window count rather than by the DMA stopping
    pub auto_stopped: bool,
    /// Samples taken after the wrap that followed a late trigger
    pub second_cycle: usize,
    /// Buffer index of the trigger sample
    pub trigger_index: usize,
    /// Buffer wraps seen during the last capture
    pub passes: u32,
    pub sample_channel: u8,
    pub control_channel: u8,
}

impl Diagnostics {
    pub const CLEARED: Self = Diagnostics {
        running: false,
        triggered: false,
        auto_stopped: false,
        second_cycle: 0,
        trigger_index: 0,
        passes: 0,
        sample_channel: 0,
        control_channel: 0,
    };
}

/// Everything the two cores exchange besides mailbox words
///
/// The controller writes `config`; the engine writes `result` and `diagnostics`.
pub struct Handoff {
    pub config: Snapshot<AcquisitionConfig>,
    pub result: Snapshot<CaptureResult>,
    pub diagnostics: Snapshot<Diagnostics>,
}

impl Handoff {
    pub const fn new() -> Self {
        Handoff {
            config: Snapshot::new(AcquisitionConfig::DEFAULT),
            result: Snapshot::new(CaptureResult::EMPTY),
            diagnostics: Snapshot::new(Diagnostics::CLEARED),
        }
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn snapshot_copies_whole_records() {
    let snapshot = Snapshot::new(AcquisitionConfig::DEFAULT);
    let mut local = snapshot.read();
    local.samples = 4096;
    assert_eq!(snapshot.read().samples, 1024);

    snapshot.publish(local);
    assert_eq!(snapshot.read(), local);

    let previous = snapshot.update(|config| {
        let previous = config.channels;
        config.channels = 2;
        previous
    });
    assert_eq!(previous, 1);
    assert_eq!(snapshot.read().channels, 2);
}

#[test]
fn handoff_starts_from_defaults() {
    let handoff = Handoff::new();
    assert_eq!(handoff.config.read(), AcquisitionConfig::DEFAULT);
    assert_eq!(handoff.result.read(), CaptureResult::EMPTY);
    assert_eq!(handoff.diagnostics.read(), Diagnostics::CLEARED);
}
