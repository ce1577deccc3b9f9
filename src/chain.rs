//! # Chain state shared with the DMA interrupt
//!
//! The control channel reads its single word out of [`ChainState`], so that word decides what
//! happens when the sample channel runs out: re-arm at the buffer base, or stop.
//!
//! The interrupt handler is the only code besides the engine's poll loop that touches this
//! state. It sets a flag and, unless the engine asked to cycle forever, nulls the restart address
//! so a second unwanted wrap cannot happen before software reacts. Only atomic loads and stores
//! are used, which every Cortex-M core supports.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::dma::ChainIrq;

/// Restart address and flags shared between the engine and the chain interrupt
pub struct ChainState {
    restart: AtomicUsize,
    chained: AtomicBool,
    forever: AtomicBool,
}

impl ChainState {
    pub const fn new() -> Self {
        ChainState {
            restart: AtomicUsize::new(0),
            chained: AtomicBool::new(false),
            forever: AtomicBool::new(false),
        }
    }

    /// Address the control channel reads the restart address from
    pub fn slot_address(&self) -> usize {
        &self.restart as *const AtomicUsize as usize
    }

    /// Address the sample channel is re-armed at; 0 means stop
    pub fn restart_address(&self) -> usize {
        self.restart.load(Ordering::Acquire)
    }

    pub fn set_restart_address(&self, address: usize) {
        self.restart.store(address, Ordering::Release);
    }

    /// Prevents the sample channel from re-arming
    pub fn disarm(&self) {
        self.set_restart_address(0);
    }

    /// Returns `true` once a chain step has happened since the last [`ChainState::arm`]
    pub fn has_chained(&self) -> bool {
        self.chained.load(Ordering::Acquire)
    }

    /// Returns `true` while the interrupt leaves the restart address alone
    pub fn cycles_forever(&self) -> bool {
        self.forever.load(Ordering::Acquire)
    }

    pub fn set_cycle_forever(&self, forever: bool) {
        self.forever.store(forever, Ordering::Release);
    }

    /// Prepares for a new capture: clears the chain flag and sets the restart policy
    pub fn arm(&self, restart_address: usize, forever: bool) {
        self.chained.store(false, Ordering::Release);
        self.forever.store(forever, Ordering::Release);
        self.set_restart_address(restart_address);
    }

    /// Body of the chain interrupt
    pub fn on_chain_complete(&self) {
        self.chained.store(true, Ordering::Release);
        if !self.forever.load(Ordering::Acquire) {
            self.restart.store(0, Ordering::Release);
        }
    }
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt handler for the control channel's completion
///
/// Call this from the DMA interrupt the control channel is routed to.
pub fn on_interrupt<I: ChainIrq>(state: &ChainState, irq: &I) {
    if irq.is_pending() {
        state.on_chain_complete();
        irq.acknowledge();
    }
}

#[test]
fn interrupt_nulls_restart_unless_cycling_forever() {
    let state = ChainState::new();
    state.arm(0x2000_0000, true);
    state.on_chain_complete();
    assert!(state.has_chained());
    assert_eq!(state.restart_address(), 0x2000_0000);

    state.arm(0x2000_0000, false);
    assert!(!state.has_chained());
    state.on_chain_complete();
    assert!(state.has_chained());
    assert_eq!(state.restart_address(), 0);
}

#[test]
fn handler_ignores_spurious_entry() {
    use core::cell::Cell;

    struct Irq {
        pending: Cell<bool>,
    }

    impl ChainIrq for Irq {
        fn is_pending(&self) -> bool {
            self.pending.get()
        }

        fn acknowledge(&self) {
            self.pending.set(false);
        }
    }

    let state = ChainState::new();
    state.arm(0x100, false);
    let irq = Irq { pending: Cell::new(false) };

    on_interrupt(&state, &irq);
    assert!(!state.has_chained());
    assert_eq!(state.restart_address(), 0x100);

    irq.pending.set(true);
    on_interrupt(&state, &irq);
    assert!(state.has_chained());
    assert!(!irq.pending.get());
    assert_eq!(state.restart_address(), 0);
}
