//! # Inter-core mailbox
//!
//! Commands travel from the controller to the engine and statuses travel back, one word at a
//! time, through a pair of bounded FIFOs. Command and status words come from disjoint ranges
//! (statuses have bit 31 set), so a word that ends up on the wrong side is always detected.
//!
//! Any word FIFO works, as long as it implements [`Fifo`]. [`Mailbox`] provides one built on
//! two `heapless` single-producer single-consumer queues, usable between cores or, in tests,
//! within one thread.
//!
//! ```rust
//! use scope_acquisition::mailbox::Mailbox;
//! use scope_acquisition::prelude::*;
//! use scope_acquisition::{Command, Status};
//!
//! let mut mailbox: Mailbox<4> = Mailbox::new();
//! let (mut controller, mut engine) = mailbox.split();
//!
//! controller.send(Command::StartSingleShot);
//! assert_eq!(engine.receive::<Command>(), Ok(Command::StartSingleShot));
//!
//! engine.send(Status::CaptureDone);
//! assert_eq!(controller.receive::<Status>(), Ok(Status::CaptureDone));
//! ```

use core::convert::Infallible;

use heapless::spsc::{Consumer, Producer, Queue};

/// Mailbox error
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The word does not encode a message of the expected kind
    UnexpectedWord(u32),
    /// A valid status arrived where a different one was required
    UnexpectedStatus(Status),
    /// A valid command arrived where it is not allowed
    UnexpectedCommand(Command),
}

/// Controller to engine
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// Capture once, completing on a trigger or after one window without one
    StartContinuous = 0,
    /// Abandon the capture in progress without reporting it
    Stop = 1,
    /// Capture once, cycling the buffer until a trigger is found
    StartSingleShot = 2,
}

/// Engine to controller
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// Sent once, when the engine has claimed its hardware
    EngineStarted = 0x8000_0000,
    /// A capture result has been published
    CaptureDone = 0x8000_0001,
}

impl From<Command> for u32 {
    fn from(command: Command) -> u32 {
        command as u32
    }
}

impl From<Status> for u32 {
    fn from(status: Status) -> u32 {
        status as u32
    }
}

impl TryFrom<u32> for Command {
    type Error = Error;

    fn try_from(word: u32) -> Result<Self, Error> {
        match word {
            0 => Ok(Command::StartContinuous),
            1 => Ok(Command::Stop),
            2 => Ok(Command::StartSingleShot),
            other => Err(Error::UnexpectedWord(other)),
        }
    }
}

impl TryFrom<u32> for Status {
    type Error = Error;

    fn try_from(word: u32) -> Result<Self, Error> {
        match word {
            0x8000_0000 => Ok(Status::EngineStarted),
            0x8000_0001 => Ok(Status::CaptureDone),
            other => Err(Error::UnexpectedWord(other)),
        }
    }
}

/// One direction-pair of a word FIFO
pub trait Fifo {
    /// Returns `true` if a word is waiting to be popped
    fn has_message(&self) -> bool;

    fn try_push(&mut self, word: u32) -> nb::Result<(), Infallible>;

    fn try_pop(&mut self) -> nb::Result<u32, Infallible>;

    /// Pushes `word`, waiting for space, then wakes the other side
    fn push_blocking(&mut self, word: u32) {
        loop {
            match self.try_push(word) {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => wait_for_event(),
                Err(nb::Error::Other(never)) => match never {},
            }
        }
        signal_event();
    }

    /// Pops a word, waiting until one arrives
    fn pop_blocking(&mut self) -> u32 {
        loop {
            match self.try_pop() {
                Ok(word) => return word,
                Err(nb::Error::WouldBlock) => wait_for_event(),
                Err(nb::Error::Other(never)) => match never {},
            }
        }
    }
}

/// Typed messages over a word [`Fifo`]
pub trait FifoExt: Fifo {
    fn send<M: Into<u32>>(&mut self, message: M) {
        self.push_blocking(message.into());
    }

    /// Waits for the next word and decodes it
    fn receive<M: TryFrom<u32, Error = Error>>(&mut self) -> Result<M, Error> {
        M::try_from(self.pop_blocking())
    }

    /// Decodes the next word if one is waiting
    fn try_receive<M: TryFrom<u32, Error = Error>>(&mut self) -> Option<Result<M, Error>> {
        if self.has_message() {
            Some(self.receive())
        } else {
            None
        }
    }
}

impl<F: Fifo + ?Sized> FifoExt for F {}

#[cfg(all(target_arch = "arm", target_os = "none"))]
fn wait_for_event() {
    cortex_m::asm::wfe();
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn wait_for_event() {
    core::hint::spin_loop();
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
fn signal_event() {
    cortex_m::asm::sev();
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn signal_event() {}

/// A pair of queues holding up to `D - 1` words each
pub struct Mailbox<const D: usize> {
    commands: Queue<u32, D>,
    statuses: Queue<u32, D>,
}

impl<const D: usize> Mailbox<D> {
    pub const fn new() -> Self {
        Mailbox {
            commands: Queue::new(),
            statuses: Queue::new(),
        }
    }

    /// Splits the mailbox into the controller's end and the engine's end
    pub fn split(&mut self) -> (QueueLink<'_, D>, QueueLink<'_, D>) {
        let (command_tx, command_rx) = self.commands.split();
        let (status_tx, status_rx) = self.statuses.split();
        (
            QueueLink {
                tx: command_tx,
                rx: status_rx,
            },
            QueueLink {
                tx: status_tx,
                rx: command_rx,
            },
        )
    }
}

impl<const D: usize> Default for Mailbox<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// One end of a [`Mailbox`]
pub struct QueueLink<'a, const D: usize> {
    tx: Producer<'a, u32, D>,
    rx: Consumer<'a, u32, D>,
}

impl<'a, const D: usize> Fifo for QueueLink<'a, D> {
    fn has_message(&self) -> bool {
        self.rx.ready()
    }

    fn try_push(&mut self, word: u32) -> nb::Result<(), Infallible> {
        self.tx.enqueue(word).map_err(|_| nb::Error::WouldBlock)
    }

    fn try_pop(&mut self) -> nb::Result<u32, Infallible> {
        self.rx.dequeue().ok_or(nb::Error::WouldBlock)
    }
}

#[test]
fn words_decode_to_their_own_kind_only() {
    for command in [Command::StartContinuous, Command::Stop, Command::StartSingleShot] {
        let word: u32 = command.into();
        assert_eq!(Command::try_from(word), Ok(command));
        assert_eq!(Status::try_from(word), Err(Error::UnexpectedWord(word)));
    }
    for status in [Status::EngineStarted, Status::CaptureDone] {
        let word: u32 = status.into();
        assert_eq!(Status::try_from(word), Ok(status));
        assert_eq!(Command::try_from(word), Err(Error::UnexpectedWord(word)));
    }
    assert_eq!(u32::from(Status::CaptureDone), 0x8000_0001);
    assert_eq!(Command::try_from(3), Err(Error::UnexpectedWord(3)));
}

#[test]
fn queue_link_is_fifo_and_bounded() {
    let mut mailbox: Mailbox<3> = Mailbox::new();
    let (mut controller, mut engine) = mailbox.split();

    assert!(!engine.has_message());
    assert_eq!(controller.try_push(0), Ok(()));
    assert_eq!(controller.try_push(1), Ok(()));
    assert_eq!(controller.try_push(2), Err(nb::Error::WouldBlock));

    assert!(engine.has_message());
    assert_eq!(engine.try_receive::<Command>(), Some(Ok(Command::StartContinuous)));
    assert_eq!(engine.try_receive::<Command>(), Some(Ok(Command::Stop)));
    assert_eq!(engine.try_receive::<Command>(), None);
    assert_eq!(engine.try_pop(), Err(nb::Error::WouldBlock));

    // the two directions are independent
    assert!(!controller.has_message());
    engine.send(Status::EngineStarted);
    assert!(controller.has_message());
    assert!(!engine.has_message());
}
