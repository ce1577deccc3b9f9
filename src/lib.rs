//! # Dual-core oscilloscope acquisition engine
//!
//! This crate implements the acquisition half of a two-core digital storage oscilloscope built
//! around an ADC whose conversions are moved into memory by DMA.
//!
//! One core (the *controller*) runs the user interface and plots captures. The other core runs
//! the [`engine::Engine`]: it owns a circular [`buffer::SampleBuffer`] that is refilled by two
//! chained DMA channels without software involvement, watches the live transfer count for a
//! trigger edge, and assembles a pre-trigger/post-trigger window that it hands back to the
//! controller.
//!
//! The two cores talk through a word [`mailbox`] (commands one way, statuses the other) and a
//! set of mutex-guarded [`snapshot`]s that carry the configuration in and the capture layout out.
//! The [`session::Session`] is the controller side of that protocol.
//!
//! The hardware is consumed through the traits in [`adc`] and [`dma`], so the whole engine can be
//! driven by a simulated ADC on the host.
//!
//! # Usage
//!
//! ## Wiring the engine on the acquisition core
//!
//! ```rust,ignore
//! use scope_acquisition::{
//!     buffer::SampleBuffer,
//!     chain::{self, ChainState},
//!     engine::Engine,
//!     mailbox::Mailbox,
//!     snapshot::Handoff,
//! };
//!
//! static BUFFER: SampleBuffer<110_000> = SampleBuffer::new();
//! static CHAIN: ChainState = ChainState::new();
//! static HANDOFF: Handoff = Handoff::new();
//!
//! fn core1_main(link: EngineLink, dma: DmaParts, adc: AdcParts) -> ! {
//!     let mut engine = Engine::new(&BUFFER, &CHAIN, dma.sample, dma.control, adc, link, &HANDOFF);
//!     engine.init();
//!     engine.run()
//! }
//!
//! #[interrupt]
//! fn DMA_IRQ_1() {
//!     chain::on_interrupt(&CHAIN, &ControlIrq);
//! }
//! ```
//!
//! ## Driving captures from the controller core
//!
//! ```rust,ignore
//! let mut session = Session::new(&BUFFER, link, &HANDOFF, AcquisitionConfig::DEFAULT);
//! session.wait_for_engine().unwrap();
//! session.connect();
//!
//! loop {
//!     session
//!         .poll(|capture| plot(capture.samples(), capture.trigger_index()))
//!         .unwrap();
//! }
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod adc;
pub mod buffer;
pub mod capture;
pub mod chain;
pub mod clock;
pub mod config;
pub mod dma;
pub mod engine;
pub mod mailbox;
pub mod prelude;
pub mod session;
pub mod snapshot;
pub mod trigger;

pub use crate::capture::{CaptureResult, Layout};
pub use crate::config::AcquisitionConfig;
pub use crate::mailbox::{Command, Status};
pub use crate::trigger::{Edge, SampleWidth, TriggerMode, TriggerSettings};
