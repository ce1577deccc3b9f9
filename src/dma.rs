//! # DMA side of the hardware contract
//!
//! Capture uses two channels:
//!
//! - the *sample* channel moves ADC FIFO words into the
//!   [`SampleBuffer`](crate::buffer::SampleBuffer), one request per conversion, and chains to the
//!   control channel when its count runs out;
//! - the *control* channel copies a single word, the restart address kept in
//!   [`ChainState`](crate::chain::ChainState), into the sample channel's
//!   write-address-and-trigger register. A non-null address re-arms the sample channel at that
//!   address; a null address leaves it stopped with a null write address.
//!
//! Owning a channel value is what claiming it means: the board support code splits its DMA
//! peripheral into channels and moves two of them into the engine.

/// Interrupt sources the engine enables
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    TransferComplete,
}

/// Operations common to both channels
pub trait DmaChannel {
    /// Hardware channel number, used for chaining
    fn id(&self) -> u8;

    /// Starts the transfer with the currently configured addresses and count
    fn start(&mut self);

    /// Aborts the transfer in progress, if any
    fn abort(&mut self);

    /// Returns `true` while a transfer is in progress
    fn is_busy(&self) -> bool;

    /// Words still to be moved by the current transfer
    ///
    /// Decremented by hardware as data moves and reloaded with the configured count whenever
    /// the channel is re-triggered.
    fn transfer_count(&self) -> u32;
}

/// Peripheral-to-memory channel that fills the sample buffer
pub trait SampleChannel: DmaChannel {
    /// 16-bit words from the ADC FIFO to `write_address` onwards (incrementing), `words` per
    /// transfer, paced by the ADC data request, chained to channel `chain_to` on completion.
    /// Completion of this channel itself must not raise an interrupt.
    fn configure(&mut self, write_address: usize, words: u32, chain_to: u8);

    /// Current write address; reads null after a null re-trigger
    fn write_address(&self) -> usize;

    /// Address of the register that sets the write address and re-triggers the channel
    fn restart_register(&self) -> usize;
}

/// Memory-to-peripheral channel that rewrites the sample channel's restart address
pub trait ControlChannel: DmaChannel {
    /// One 32-bit word from `read_address` to `write_address`, neither incrementing
    fn configure(&mut self, write_address: usize, read_address: usize);

    fn listen(&mut self, event: Event);

    fn unlisten(&mut self, event: Event);
}

/// Interrupt status of the control channel, as seen from the handler
///
/// Implementors are usually zero-sized: acknowledging is a write-one-to-clear of a status bit,
/// so no exclusive access is needed.
pub trait ChainIrq {
    fn is_pending(&self) -> bool;

    fn acknowledge(&self);
}
