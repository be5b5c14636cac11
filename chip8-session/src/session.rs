//! A single machine running at a fixed frame rate.
use std::{
    num::NonZeroU32,
    sync::{
        mpsc::{self, Receiver, SyncSender, TrySendError},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use chip8::{Clock, Hz, Steppable};
use log::{debug, error, info, trace, warn};

use crate::{
    error::{ErrorKind, SessionResult},
    message::{Outbound, ParamChange, SessionId},
    sink::{BoxedSink, FrameSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    /// Terminal. A stopped gate never opens again.
    Stopped,
}

/// Run state shared between a session and its controllers.
///
/// The session blocks on the gate while paused, and sleeps on it
/// between frames so that pausing or stopping wakes it immediately.
#[derive(Debug)]
pub struct Gate {
    state: Mutex<RunState>,
    changed: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Running),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RunState {
        *self.lock()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    /// Returns `false` if the gate was not running.
    pub fn pause(&self) -> bool {
        self.transition(RunState::Running, RunState::Paused)
    }

    /// Returns `false` if the gate was not paused.
    pub fn unpause(&self) -> bool {
        self.transition(RunState::Paused, RunState::Running)
    }

    /// Flip between running and paused, returning whether the gate is now paused.
    pub fn toggle(&self) -> bool {
        let mut state = self.lock();
        *state = match *state {
            RunState::Running => RunState::Paused,
            RunState::Paused => RunState::Running,
            RunState::Stopped => RunState::Stopped,
        };
        self.changed.notify_all();
        *state == RunState::Paused
    }

    pub fn stop(&self) {
        *self.lock() = RunState::Stopped;
        self.changed.notify_all();
    }

    fn transition(&self, from: RunState, to: RunState) -> bool {
        let mut state = self.lock();
        if *state == from {
            *state = to;
            self.changed.notify_all();
            true
        } else {
            false
        }
    }

    /// Block until the gate is no longer paused.
    pub fn wait_while_paused(&self) -> RunState {
        let state = self
            .changed
            .wait_while(self.lock(), |state| *state == RunState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        *state
    }

    /// Sleep up to `timeout`, returning early when the gate leaves the running state.
    pub fn sleep(&self, timeout: Duration) -> RunState {
        let (state, _) = self
            .changed
            .wait_timeout_while(self.lock(), timeout, |state| *state == RunState::Running)
            .unwrap_or_else(PoisonError::into_inner);
        *state
    }
}

#[derive(Debug)]
pub(crate) enum ParamMsg {
    Change(ParamChange),
    /// Wakes the session so it notices the gate was stopped.
    Stop,
}

/// Handle used to steer a running [`Session`] from other threads.
#[derive(Debug, Clone)]
pub struct SessionControl {
    id: SessionId,
    gate: Arc<Gate>,
    params: SyncSender<ParamMsg>,
}

impl SessionControl {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn pause(&self) -> bool {
        self.gate.pause()
    }

    pub fn unpause(&self) -> bool {
        self.gate.unpause()
    }

    pub fn toggle_pause(&self) -> bool {
        self.gate.toggle()
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn state(&self) -> RunState {
        self.gate.state()
    }

    /// Queue a parameter change, applied after the next frame.
    pub fn put_params(&self, change: ParamChange) -> SessionResult<()> {
        self.params
            .try_send(ParamMsg::Change(change))
            .map_err(|err| match err {
                TrySendError::Full(_) => ErrorKind::ParamQueueFull(self.id.clone()).into(),
                TrySendError::Disconnected(_) => ErrorKind::NotRunning(self.id.clone()).into(),
            })
    }

    /// Request termination. The session exits before starting another frame.
    pub fn stop(&self) {
        self.gate.stop();
        let _ = self.params.try_send(ParamMsg::Stop);
    }
}

/// Outcome of a single scheduler iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A frame was produced. The session should wait `sleep` before the next one.
    Ran { sleep: Duration },
    Paused,
    Stopped,
}

/// Drives a machine, pushing one frame to the sink per period.
pub struct Session<M> {
    id: SessionId,
    machine: M,
    sink: BoxedSink,
    gate: Arc<Gate>,
    params: Receiver<ParamMsg>,
    frame_rate: NonZeroU32,
    cycles_per_frame: NonZeroU32,
    pacer: Clock,
}

impl<M: Steppable> Session<M> {
    pub fn new(
        id: SessionId,
        machine: M,
        sink: BoxedSink,
        frame_rate: NonZeroU32,
        cycles_per_frame: NonZeroU32,
        param_capacity: usize,
    ) -> (Self, SessionControl) {
        let gate = Arc::new(Gate::new());
        let (tx, rx) = mpsc::sync_channel(param_capacity.max(1));

        let control = SessionControl {
            id: id.clone(),
            gate: gate.clone(),
            params: tx,
        };
        let session = Self {
            id,
            machine,
            sink,
            gate,
            params: rx,
            frame_rate,
            cycles_per_frame,
            pacer: Clock::from_hz(Hz(u64::from(frame_rate.get()))),
        };

        (session, control)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn frame_rate(&self) -> NonZeroU32 {
        self.frame_rate
    }

    pub fn cycles_per_frame(&self) -> NonZeroU32 {
        self.cycles_per_frame
    }

    /// Run one frame if the gate allows it. Never blocks.
    pub fn tick(&mut self) -> Tick {
        match self.gate.state() {
            RunState::Paused => return Tick::Paused,
            RunState::Stopped => return Tick::Stopped,
            RunState::Running => {}
        }

        self.pacer.reset();

        if let Err(err) = self.machine.cycle(self.cycles_per_frame.get() as usize) {
            error!("{}: machine fault: {err}", self.id);
            if let Err(err) = self.sink.send(Outbound::error(&err)) {
                debug!("{}: fault report not delivered: {err}", self.id);
            }
            self.gate.stop();
            return Tick::Stopped;
        }

        let frame = Outbound::Frame {
            frame: self.machine.display().frame(),
        };
        if let Err(err) = self.sink.send(frame) {
            warn!("{}: frame not delivered, stopping: {err}", self.id);
            self.gate.stop();
            return Tick::Stopped;
        }

        self.apply_params();

        Tick::Ran {
            sleep: self.pacer.remaining(),
        }
    }

    fn apply_params(&mut self) {
        for msg in self.params.try_iter() {
            let change = match msg {
                ParamMsg::Change(change) => change,
                ParamMsg::Stop => break,
            };
            trace!("{}: {change:?}", self.id);

            if let Some(cycles_per_frame) = change.cycles_per_frame {
                self.cycles_per_frame = cycles_per_frame;
            }
            if let Some(frame_rate) = change.frame_rate {
                self.frame_rate = frame_rate;
                self.pacer.set_period(Hz(u64::from(frame_rate.get())).into());
            }
        }
    }

    /// Run until stopped, then give the sink back.
    pub fn run(mut self) -> BoxedSink {
        info!(
            "{}: running at {} frames/s, {} cycles/frame",
            self.id, self.frame_rate, self.cycles_per_frame
        );

        loop {
            match self.tick() {
                Tick::Ran { sleep } => {
                    if self.gate.sleep(sleep) == RunState::Stopped {
                        break;
                    }
                }
                Tick::Paused => {
                    debug!("{}: paused", self.id);
                    if self.gate.wait_while_paused() == RunState::Stopped {
                        break;
                    }
                    debug!("{}: resumed", self.id);
                }
                Tick::Stopped => break,
            }
        }

        info!("{}: stopped", self.id);
        self.sink
    }
}
