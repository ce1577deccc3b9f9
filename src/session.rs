//! # Controller side of the acquisition protocol
//!
//! The [`Session`] turns the user's trigger mode into start and stop commands, keeps the working
//! configuration that the user edits, and hands every completed capture to the caller before
//! starting the next one.
//!
//! | Mode                  | State               | After a capture            |
//! |-----------------------|---------------------|----------------------------|
//! | [`TriggerMode::Auto`]   | `RunningContinuous` | start continuous again     |
//! | [`TriggerMode::Normal`] | `RunningSingle`     | start single shot again    |
//! | [`TriggerMode::Wait`]   | `WaitingForTrigger` | pause, indicator shows Hold |
//! | [`TriggerMode::Hold`]   | `Paused`            | (nothing is running)       |

use crate::buffer::SampleBuffer;
use crate::capture::CaptureView;
use crate::config::AcquisitionConfig;
use crate::mailbox::{Command, Error, Fifo, FifoExt, Status};
use crate::snapshot::Handoff;
use crate::trigger::TriggerMode;

/// Acquisition state as seen by the controller
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected; nothing is running
    Stopped,
    RunningContinuous,
    RunningSingle,
    /// One single shot in flight, pause when it completes
    WaitingForTrigger,
    /// Last capture kept, nothing is running
    Paused,
}

impl SessionState {
    fn for_mode(mode: TriggerMode) -> Self {
        match mode {
            TriggerMode::Auto => SessionState::RunningContinuous,
            TriggerMode::Normal => SessionState::RunningSingle,
            TriggerMode::Wait => SessionState::WaitingForTrigger,
            TriggerMode::Hold => SessionState::Paused,
        }
    }

    /// Command that (re)starts acquisition in this state
    fn start_command(self) -> Option<Command> {
        match self {
            SessionState::RunningContinuous => Some(Command::StartContinuous),
            SessionState::RunningSingle | SessionState::WaitingForTrigger => {
                Some(Command::StartSingleShot)
            }
            SessionState::Stopped | SessionState::Paused => None,
        }
    }
}

/// Controller end of the acquisition protocol
pub struct Session<'a, const N: usize, F> {
    buffer: &'a SampleBuffer<N>,
    link: F,
    handoff: &'a Handoff,
    config: AcquisitionConfig,
    mode: TriggerMode,
    state: SessionState,
    cycles: u32,
}

impl<'a, const N: usize, F> Session<'a, N, F>
where
    F: Fifo,
{
    pub fn new(
        buffer: &'a SampleBuffer<N>,
        link: F,
        handoff: &'a Handoff,
        config: AcquisitionConfig,
    ) -> Self {
        Session {
            buffer,
            link,
            handoff,
            config,
            mode: TriggerMode::Auto,
            state: SessionState::Stopped,
            cycles: 0,
        }
    }

    /// Blocks until the engine reports that it is up
    pub fn wait_for_engine(&mut self) -> Result<(), Error> {
        match self.link.receive::<Status>()? {
            Status::EngineStarted => {
                info!("acquisition engine ready");
                Ok(())
            }
            other => Err(Error::UnexpectedStatus(other)),
        }
    }

    /// Starts continuous acquisition with the current configuration
    pub fn connect(&mut self) {
        self.mode = TriggerMode::Auto;
        self.enter(SessionState::RunningContinuous);
    }

    /// Stops acquisition until the next [`Session::connect`]
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Stopped {
            self.link.send(Command::Stop);
        }
        self.state = SessionState::Stopped;
        debug!("disconnected");
    }

    /// Switches trigger mode
    ///
    /// Any change of state stops the engine, republishes the configuration and restarts it in
    /// the new mode. Selecting [`TriggerMode::Wait`] again after its capture arrived re-arms it.
    /// While disconnected the mode is only recorded.
    pub fn set_mode(&mut self, mode: TriggerMode) {
        self.mode = mode;
        if self.state == SessionState::Stopped {
            return;
        }
        let target = SessionState::for_mode(mode);
        if target != self.state {
            self.link.send(Command::Stop);
            self.enter(target);
        }
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mode to show to the user: [`TriggerMode::Hold`] whenever acquisition is paused
    pub fn indicator(&self) -> TriggerMode {
        match self.state {
            SessionState::Paused => TriggerMode::Hold,
            _ => self.mode,
        }
    }

    /// Working configuration; edits apply from the next start
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AcquisitionConfig {
        &mut self.config
    }

    /// Publishes the working configuration, clamped to what the buffer can hold
    pub fn publish_config(&mut self) {
        let config = self.config.clamped(N);
        if config != self.config {
            warn!("configuration clamped to {} samples", config.samples);
        }
        self.handoff.config.publish(config);
    }

    /// Handles one status from the engine, if there is one
    ///
    /// A completed capture is passed to `on_capture` while the engine is idle; the next capture
    /// is started afterwards, so the closure sees a stable buffer. Completions that belong to a
    /// capture the session has since stopped or restarted are dropped.
    pub fn poll<R>(
        &mut self,
        on_capture: impl FnOnce(&CaptureView<'_, N>) -> R,
    ) -> Result<Option<R>, Error> {
        let status = match self.link.try_receive::<Status>() {
            Some(status) => status?,
            None => return Ok(None),
        };
        if status != Status::CaptureDone {
            return Err(Error::UnexpectedStatus(status));
        }

        let result = self.handoff.result.read();
        if self.state.start_command().is_none() || result.cycle != self.cycles {
            debug!("dropping stale capture #{}", result.cycle);
            return Ok(None);
        }

        // NOTE(unsafe) the engine stays idle until the next start command, sent below
        let view = unsafe { CaptureView::new(self.buffer, result) };
        let output = on_capture(&view);

        if self.state == SessionState::WaitingForTrigger {
            self.state = SessionState::Paused;
            debug!("single shot captured, holding");
        } else {
            self.restart();
        }
        Ok(Some(output))
    }

    fn enter(&mut self, state: SessionState) {
        debug!("session {} -> {}", self.state, state);
        self.state = state;
        self.restart();
    }

    fn restart(&mut self) {
        if let Some(command) = self.state.start_command() {
            self.publish_config();
            self.cycles = self.cycles.wrapping_add(1);
            self.link.send(command);
        }
    }
}

#[test]
fn handshake_and_commands() {
    use crate::mailbox::Mailbox;

    let buffer = SampleBuffer::<16>::new();
    let handoff = Handoff::new();
    let mut mailbox: Mailbox<4> = Mailbox::new();
    let (controller, mut engine) = mailbox.split();
    let mut session = Session::new(&buffer, controller, &handoff, AcquisitionConfig::DEFAULT);

    engine.send(Status::CaptureDone);
    assert_eq!(
        session.wait_for_engine(),
        Err(Error::UnexpectedStatus(Status::CaptureDone))
    );
    engine.send(Status::EngineStarted);
    assert_eq!(session.wait_for_engine(), Ok(()));

    // nothing is running, so a completion is stale
    engine.send(Status::CaptureDone);
    assert_eq!(session.poll(|_| ()), Ok(None));
    engine.send(Status::EngineStarted);
    assert_eq!(
        session.poll(|_| ()),
        Err(Error::UnexpectedStatus(Status::EngineStarted))
    );

    session.set_mode(TriggerMode::Normal);
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!engine.has_message());

    session.connect();
    assert_eq!(engine.receive::<Command>(), Ok(Command::StartContinuous));
    assert_eq!(session.mode(), TriggerMode::Auto);
    // published clamped to the 16-word buffer
    assert_eq!(handoff.config.read(), AcquisitionConfig::DEFAULT.clamped(16));
    assert_eq!(handoff.config.read().samples, 16);

    session.set_mode(TriggerMode::Auto);
    assert!(!engine.has_message());

    session.set_mode(TriggerMode::Hold);
    assert_eq!(engine.receive::<Command>(), Ok(Command::Stop));
    assert!(!engine.has_message());
    assert_eq!(session.indicator(), TriggerMode::Hold);

    session.set_mode(TriggerMode::Normal);
    assert_eq!(engine.receive::<Command>(), Ok(Command::Stop));
    assert_eq!(engine.receive::<Command>(), Ok(Command::StartSingleShot));
}
