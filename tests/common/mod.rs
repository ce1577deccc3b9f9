//! Simulated converter and DMA controller
//!
//! Every [`Sim::tick`] is one conversion: the source function is sampled at the current stream
//! position and, if the sample channel is running, the word lands in the buffer. When the sample
//! channel's count runs out it chains to the control channel, which reloads the restart address
//! from the chain slot and raises the chain interrupt, just like the hardware.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use scope_acquisition::adc::{AdcControl, FifoConfig, InputMask};
use scope_acquisition::buffer::SampleBuffer;
use scope_acquisition::chain::{self, ChainState};
use scope_acquisition::clock::AdcDivider;
use scope_acquisition::dma::{ChainIrq, ControlChannel, DmaChannel, Event, SampleChannel};
use scope_acquisition::engine::Engine;
use scope_acquisition::mailbox::{Mailbox, QueueLink};
use scope_acquisition::prelude::*;
use scope_acquisition::snapshot::Handoff;
use scope_acquisition::{AcquisitionConfig, CaptureResult, Command, Status};

pub const CAPACITY: usize = 16;
pub const SAMPLE_CHANNEL: u8 = 2;
pub const CONTROL_CHANNEL: u8 = 3;
const RESTART_REGISTER: usize = 0x5000_00bc;

pub const LOW: u16 = 0;
pub const HIGH: u16 = 4000;

pub type Link = QueueLink<'static, 8>;
pub type SimEngine = Engine<'static, CAPACITY, SampleDma, ControlDma, SimAdc, Link>;

struct Hw {
    source: Box<dyn FnMut(usize) -> u16>,
    buffer: &'static SampleBuffer<CAPACITY>,
    position: usize,

    write_address: usize,
    words: u32,
    count: u32,
    busy: bool,
    chain_to: u8,
    chains: u32,

    control_write: usize,
    control_read: usize,
    listening: bool,
    irq_pending: bool,

    running: bool,
    resets: u32,
    input: u8,
    round_robin: InputMask,
    divider: AdcDivider,
    fifo: Option<FifoConfig>,
}

#[derive(Clone)]
pub struct Sim {
    hw: Rc<RefCell<Hw>>,
    chain: &'static ChainState,
}

impl Sim {
    fn new(
        source: impl FnMut(usize) -> u16 + 'static,
        buffer: &'static SampleBuffer<CAPACITY>,
        chain: &'static ChainState,
    ) -> Self {
        let hw = Hw {
            source: Box::new(source),
            buffer,
            position: 0,
            write_address: 0,
            words: 0,
            count: 0,
            busy: false,
            chain_to: u8::MAX,
            chains: 0,
            control_write: 0,
            control_read: 0,
            listening: false,
            irq_pending: false,
            running: false,
            resets: 0,
            input: 0,
            round_robin: InputMask::empty(),
            divider: AdcDivider::FREE_RUNNING,
            fifo: None,
        };
        Sim {
            hw: Rc::new(RefCell::new(hw)),
            chain,
        }
    }

    /// One conversion
    pub fn tick(&self) {
        let raise = {
            let mut hw = self.hw.borrow_mut();
            if !hw.running {
                return;
            }
            let position = hw.position;
            let value = (hw.source)(position);
            hw.position += 1;
            if !hw.busy {
                return;
            }

            let index = (hw.write_address - hw.buffer.address()) / 2;
            assert!(index < CAPACITY, "sample channel ran past the buffer");
            unsafe { hw.buffer.as_mut_ptr().add(index).write_volatile(value) };
            hw.write_address += 2;
            hw.count -= 1;

            if hw.count > 0 {
                false
            } else {
                hw.busy = false;
                assert_eq!(hw.chain_to, CONTROL_CHANNEL);
                assert_eq!(hw.control_write, RESTART_REGISTER);
                let slot = hw.control_read as *const AtomicUsize;
                let restart = unsafe { (*slot).load(Ordering::SeqCst) };

                hw.chains += 1;
                hw.write_address = restart;
                if restart != 0 {
                    hw.count = hw.words;
                    hw.busy = true;
                }
                hw.irq_pending = hw.listening;
                hw.irq_pending
            }
        };

        if raise {
            chain::on_interrupt(self.chain, &ControlIrq(self.hw.clone()));
        }
    }

    pub fn ticks(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn sample_dma(&self) -> SampleDma {
        SampleDma(self.hw.clone())
    }

    pub fn control_dma(&self) -> ControlDma {
        ControlDma(self.hw.clone())
    }

    pub fn adc(&self) -> SimAdc {
        SimAdc(self.hw.clone())
    }

    pub fn converting(&self) -> bool {
        self.hw.borrow().running
    }

    pub fn sampling(&self) -> bool {
        self.hw.borrow().busy
    }

    pub fn listening(&self) -> bool {
        self.hw.borrow().listening
    }

    pub fn chains(&self) -> u32 {
        self.hw.borrow().chains
    }

    pub fn resets(&self) -> u32 {
        self.hw.borrow().resets
    }

    pub fn round_robin(&self) -> InputMask {
        self.hw.borrow().round_robin
    }

    pub fn input(&self) -> u8 {
        self.hw.borrow().input
    }

    pub fn divider(&self) -> AdcDivider {
        self.hw.borrow().divider
    }

    pub fn fifo(&self) -> Option<FifoConfig> {
        self.hw.borrow().fifo
    }
}

pub struct SampleDma(Rc<RefCell<Hw>>);

impl DmaChannel for SampleDma {
    fn id(&self) -> u8 {
        SAMPLE_CHANNEL
    }

    fn start(&mut self) {
        self.0.borrow_mut().busy = true;
    }

    fn abort(&mut self) {
        self.0.borrow_mut().busy = false;
    }

    fn is_busy(&self) -> bool {
        self.0.borrow().busy
    }

    fn transfer_count(&self) -> u32 {
        self.0.borrow().count
    }
}

impl SampleChannel for SampleDma {
    fn configure(&mut self, write_address: usize, words: u32, chain_to: u8) {
        let mut hw = self.0.borrow_mut();
        hw.write_address = write_address;
        hw.words = words;
        hw.count = words;
        hw.chain_to = chain_to;
        hw.busy = false;
    }

    fn write_address(&self) -> usize {
        self.0.borrow().write_address
    }

    fn restart_register(&self) -> usize {
        RESTART_REGISTER
    }
}

pub struct ControlDma(Rc<RefCell<Hw>>);

impl DmaChannel for ControlDma {
    fn id(&self) -> u8 {
        CONTROL_CHANNEL
    }

    fn start(&mut self) {}

    fn abort(&mut self) {}

    fn is_busy(&self) -> bool {
        false
    }

    fn transfer_count(&self) -> u32 {
        1
    }
}

impl ControlChannel for ControlDma {
    fn configure(&mut self, write_address: usize, read_address: usize) {
        let mut hw = self.0.borrow_mut();
        hw.control_write = write_address;
        hw.control_read = read_address;
    }

    fn listen(&mut self, event: Event) {
        assert_eq!(event, Event::TransferComplete);
        self.0.borrow_mut().listening = true;
    }

    fn unlisten(&mut self, _event: Event) {
        self.0.borrow_mut().listening = false;
    }
}

pub struct ControlIrq(Rc<RefCell<Hw>>);

impl ChainIrq for ControlIrq {
    fn is_pending(&self) -> bool {
        self.0.borrow().irq_pending
    }

    fn acknowledge(&self) {
        self.0.borrow_mut().irq_pending = false;
    }
}

pub struct SimAdc(Rc<RefCell<Hw>>);

impl AdcControl for SimAdc {
    fn reset(&mut self) {
        let mut hw = self.0.borrow_mut();
        hw.resets += 1;
        hw.running = false;
        hw.position = 0;
        hw.input = 0;
        hw.round_robin = InputMask::empty();
        hw.fifo = None;
    }

    fn run(&mut self, enable: bool) {
        self.0.borrow_mut().running = enable;
    }

    fn select_input(&mut self, input: u8) {
        self.0.borrow_mut().input = input;
    }

    fn set_round_robin(&mut self, inputs: InputMask) {
        self.0.borrow_mut().round_robin = inputs;
    }

    fn set_clock_divider(&mut self, divider: AdcDivider) {
        self.0.borrow_mut().divider = divider;
    }

    fn configure_fifo(&mut self, fifo: FifoConfig) {
        self.0.borrow_mut().fifo = Some(fifo);
    }
}

/// Engine wired to a simulated board, plus the shared statics
pub struct Rig {
    pub engine: SimEngine,
    pub sim: Sim,
    pub buffer: &'static SampleBuffer<CAPACITY>,
    pub chain: &'static ChainState,
    pub handoff: &'static Handoff,
}

/// Builds and initializes an engine; returns it with the controller's end of the mailbox
pub fn rig(source: impl FnMut(usize) -> u16 + 'static) -> (Rig, Link) {
    let buffer: &'static SampleBuffer<CAPACITY> = Box::leak(Box::new(SampleBuffer::new()));
    let chain: &'static ChainState = Box::leak(Box::new(ChainState::new()));
    let handoff: &'static Handoff = Box::leak(Box::new(Handoff::new()));
    let mailbox: &'static mut Mailbox<8> = Box::leak(Box::new(Mailbox::new()));
    let (controller, link) = mailbox.split();

    let sim = Sim::new(source, buffer, chain);
    let mut engine = Engine::new(
        buffer,
        chain,
        sim.sample_dma(),
        sim.control_dma(),
        sim.adc(),
        link,
        handoff,
    );
    engine.init();

    let rig = Rig {
        engine,
        sim,
        buffer,
        chain,
        handoff,
    };
    (rig, controller)
}

/// [`rig`] with the start handshake already consumed
pub fn booted(source: impl FnMut(usize) -> u16 + 'static) -> (Rig, Link) {
    let (rig, mut controller) = rig(source);
    assert_eq!(controller.receive::<Status>(), Ok(Status::EngineStarted));
    (rig, controller)
}

/// A single step from [`LOW`] to [`HIGH`] at stream position `at`
pub fn step_at(at: usize) -> impl FnMut(usize) -> u16 {
    move |position| if position >= at { HIGH } else { LOW }
}

/// 10 samples, 2 of them before the trigger, 500 mV rising edge
pub fn window_config() -> AcquisitionConfig {
    AcquisitionConfig::DEFAULT.samples(10)
}

impl Rig {
    /// One engine poll followed by one conversion
    pub fn step(&mut self) {
        self.engine.poll().unwrap();
        self.sim.tick();
    }

    pub fn start(&mut self, controller: &mut Link, config: AcquisitionConfig, command: Command) {
        self.handoff.config.publish(config);
        controller.send(command);
        self.engine.poll().unwrap();
    }

    /// Steps until the engine reports a capture, at most `max_ticks` conversions
    pub fn run_until_done(
        &mut self,
        controller: &mut Link,
        max_ticks: usize,
    ) -> Option<CaptureResult> {
        for _ in 0..=max_ticks {
            self.engine.poll().unwrap();
            if controller.has_message() {
                assert_eq!(controller.receive::<Status>(), Ok(Status::CaptureDone));
                return Some(self.handoff.result.read());
            }
            self.sim.tick();
        }
        None
    }

    /// Samples of a published window in acquisition order
    pub fn window(&self, result: &CaptureResult) -> Vec<u16> {
        let (first, second) = result.layout.segments();
        first.chain(second).map(|i| self.buffer.read(i)).collect()
    }
}
