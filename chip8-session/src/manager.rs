//! Registry of running sessions.
use std::{
    collections::HashMap,
    mem,
    sync::{
        mpsc::{self, RecvTimeoutError, Sender},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use chip8::{Chip8Conf, Chip8Vm, InputSender, QueuedVm};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    conf::{ManagerConf, Rom},
    error::{ErrorKind, SessionError, SessionResult},
    message::{InputEvent, Outbound, ParamChange, SessionId},
    session::{Session, SessionControl},
    sink::{BoxedSink, FrameSink},
};

pub const CAPACITY_MESSAGE: &str = "Too many sessions, come back later.";

/// Owns every session and the shared limits they run under.
///
/// Cloning the manager is cheap and every clone refers to the same
/// registry, so it can be handed to transport threads and the sweeper.
#[derive(Clone)]
pub struct VmManager {
    inner: Arc<Inner>,
}

struct Inner {
    conf: ManagerConf,
    sessions: Mutex<HashMap<SessionId, Slot>>,
}

struct Slot {
    last_active: Instant,
    state: SlotState,
}

enum SlotState {
    Running(Running),
    /// Machine released. The client channel is kept for a later ROM.
    Unloaded(BoxedSink),
    /// A session thread is being started or joined outside of the lock.
    Pending,
}

struct Running {
    control: SessionControl,
    input: InputSender,
    task: JoinHandle<BoxedSink>,
}

impl Slot {
    fn running(running: Running) -> Self {
        Self {
            last_active: Instant::now(),
            state: SlotState::Running(running),
        }
    }

    fn pending() -> Self {
        Self {
            last_active: Instant::now(),
            state: SlotState::Pending,
        }
    }

    fn is_finished(&self) -> bool {
        match &self.state {
            SlotState::Running(running) => running.task.is_finished(),
            _ => false,
        }
    }
}

/// Session counts for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub current_sessions: usize,
    pub max_sessions: usize,
}

impl VmManager {
    pub fn new(conf: ManagerConf) -> Self {
        Self {
            inner: Arc::new(Inner {
                conf,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn conf(&self) -> &ManagerConf {
        &self.inner.conf
    }

    fn sessions(&self) -> MutexGuard<HashMap<SessionId, Slot>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget sessions whose thread already ended, closing their sinks.
    fn reap_finished(&self) {
        let finished: Vec<(SessionId, Running)> = {
            let mut sessions = self.sessions();
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, slot)| slot.is_finished())
                .map(|(id, _)| id.clone())
                .collect();

            ids.into_iter()
                .filter_map(|id| match sessions.remove(&id) {
                    Some(Slot {
                        state: SlotState::Running(running),
                        ..
                    }) => Some((id, running)),
                    _ => None,
                })
                .collect()
        };

        for (id, running) in finished {
            info!("{id}: machine stopped on its own");
            if let Some(mut sink) = halt(&id, running) {
                sink.close();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.reap_finished();
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.reap_finished();
        self.sessions().contains_key(id)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions().keys().cloned().collect()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            current_sessions: self.len(),
            max_sessions: self.inner.conf.max_sessions,
        }
    }

    /// Names of the ROMs clients may request.
    pub fn catalog(&self) -> Vec<&str> {
        self.inner.conf.roms.keys().map(|name| name.as_str()).collect()
    }

    /// Start a session under a fresh random id.
    pub fn start(&self, rom: &Rom, sink: impl FrameSink + 'static) -> SessionResult<SessionId> {
        let id = SessionId::random();
        self.start_with_id(id.clone(), rom, sink)?;
        Ok(id)
    }

    /// Start a session under the given id.
    ///
    /// The client is told its id through the sink before the first frame.
    /// When the session cannot be admitted the client gets an error
    /// message instead and the sink is closed.
    pub fn start_with_id(
        &self,
        id: SessionId,
        rom: &Rom,
        sink: impl FrameSink + 'static,
    ) -> SessionResult<()> {
        let sink: BoxedSink = Box::new(sink);

        let machine = match self.build_machine(rom) {
            Ok(vm) => vm,
            Err(err) => {
                warn!("{id}: rejected, {err}");
                reject(sink, &err);
                return Err(err);
            }
        };

        self.reap_finished();

        // Reserve the id, so the acknowledgement and spawn can happen unlocked.
        let max_sessions = self.inner.conf.max_sessions;
        let admission = {
            let mut sessions = self.sessions();
            if sessions.contains_key(&id) {
                Err(ErrorKind::AlreadyExists(id.clone()))
            } else if sessions.len() >= max_sessions {
                Err(ErrorKind::CapacityReached { max_sessions })
            } else {
                sessions.insert(id.clone(), Slot::pending());
                Ok(())
            }
        };

        if let Err(kind) = admission {
            let err = SessionError::new(kind);
            warn!("{id}: rejected, {err}");
            match err.kind {
                ErrorKind::CapacityReached { .. } => reject(sink, CAPACITY_MESSAGE),
                _ => reject(sink, &err),
            }
            return Err(err);
        }

        let running = match self.launch(&id, rom, machine, sink) {
            Ok(running) => running,
            Err(err) => {
                self.sessions().remove(&id);
                return Err(err);
            }
        };

        let orphan = {
            let mut sessions = self.sessions();
            match sessions.get_mut(&id) {
                Some(slot) => {
                    *slot = Slot::running(running);
                    info!("{id}: started, {} of {max_sessions} sessions", sessions.len());
                    None
                }
                None => Some(running),
            }
        };

        match orphan {
            None => Ok(()),
            // Stopped while starting up.
            Some(running) => {
                if let Some(mut sink) = halt(&id, running) {
                    sink.close();
                }
                Err(ErrorKind::NotFound(id).into())
            }
        }
    }

    fn build_machine(&self, rom: &Rom) -> SessionResult<Chip8Vm> {
        let mut vm = Chip8Vm::new(Chip8Conf {
            timer_mode: self.inner.conf.timer_mode,
            seed: None,
        });
        vm.read_rom(&rom.bytes)?;
        Ok(vm)
    }

    fn launch(
        &self,
        id: &SessionId,
        rom: &Rom,
        vm: Chip8Vm,
        mut sink: BoxedSink,
    ) -> SessionResult<Running> {
        let conf = &self.inner.conf;

        sink.send(Outbound::Started {
            session_id: id.clone(),
        })?;

        let (machine, input) = QueuedVm::new(vm, conf.input_queue_capacity);
        let (session, control) = Session::new(
            id.clone(),
            machine,
            sink,
            rom.frame_rate,
            rom.cycles_per_frame,
            conf.param_queue_capacity,
        );

        let task = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || session.run())?;

        Ok(Running {
            control,
            input,
            task,
        })
    }

    /// Stop the session, close its sink and forget it.
    pub fn stop(&self, id: &SessionId) -> SessionResult<()> {
        let slot = self
            .sessions()
            .remove(id)
            .ok_or_else(|| ErrorKind::NotFound(id.clone()))?;

        match slot.state {
            SlotState::Running(running) => {
                if let Some(mut sink) = halt(id, running) {
                    sink.close();
                }
            }
            SlotState::Unloaded(mut sink) => sink.close(),
            // Whoever starts or joins the thread finds the slot gone and closes the sink.
            SlotState::Pending => {}
        }

        info!("{id}: removed");
        Ok(())
    }

    /// Stop the machine but keep the session registered, holding on to its sink.
    pub fn unload(&self, id: &SessionId) -> SessionResult<()> {
        let running = {
            let mut sessions = self.sessions();
            let slot = sessions
                .get_mut(id)
                .ok_or_else(|| ErrorKind::NotFound(id.clone()))?;

            match mem::replace(&mut slot.state, SlotState::Pending) {
                SlotState::Running(running) => running,
                other => {
                    slot.state = other;
                    return Err(ErrorKind::NotRunning(id.clone()).into());
                }
            }
        };

        let sink = halt(id, running);

        let mut sessions = self.sessions();
        match (sessions.get_mut(id), sink) {
            (Some(slot), Some(sink)) => {
                slot.state = SlotState::Unloaded(sink);
                debug!("{id}: unloaded");
                Ok(())
            }
            (Some(_), None) => {
                sessions.remove(id);
                Err(ErrorKind::Panicked(id.clone()).into())
            }
            // Stopped while we were joining.
            (None, Some(mut sink)) => {
                sink.close();
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    /// Replace the program of a session, reusing its client channel.
    ///
    /// The new ROM is validated first. On failure the old program keeps running.
    pub fn change_rom(&self, id: &SessionId, rom: &Rom) -> SessionResult<()> {
        let vm = self.build_machine(rom)?;

        match self.unload(id) {
            Ok(()) => {}
            Err(SessionError {
                kind: ErrorKind::NotRunning(_),
            }) => {}
            Err(err) => return Err(err),
        }

        let sink = {
            let mut sessions = self.sessions();
            let slot = sessions
                .get_mut(id)
                .ok_or_else(|| ErrorKind::NotFound(id.clone()))?;

            match mem::replace(&mut slot.state, SlotState::Pending) {
                SlotState::Unloaded(sink) => sink,
                other => {
                    slot.state = other;
                    return Err(ErrorKind::NotRunning(id.clone()).into());
                }
            }
        };

        let running = match self.launch(id, rom, vm, sink) {
            Ok(running) => running,
            Err(err) => {
                error!("{id}: relaunch failed: {err}");
                self.sessions().remove(id);
                return Err(err);
            }
        };

        let orphan = match self.sessions().get_mut(id) {
            Some(slot) => {
                *slot = Slot::running(running);
                None
            }
            None => Some(running),
        };

        match orphan {
            None => {
                info!("{id}: program replaced");
                Ok(())
            }
            Some(running) => {
                if let Some(mut sink) = halt(id, running) {
                    sink.close();
                }
                Err(ErrorKind::NotFound(id.clone()).into())
            }
        }
    }

    fn control(&self, id: &SessionId) -> SessionResult<SessionControl> {
        self.reap_finished();
        match self.sessions().get(id) {
            Some(Slot {
                state: SlotState::Running(running),
                ..
            }) => Ok(running.control.clone()),
            Some(_) => Err(ErrorKind::NotRunning(id.clone()).into()),
            None => Err(ErrorKind::NotFound(id.clone()).into()),
        }
    }

    pub fn pause(&self, id: &SessionId) -> SessionResult<()> {
        if self.control(id)?.pause() {
            debug!("{id}: pause requested");
        }
        Ok(())
    }

    pub fn unpause(&self, id: &SessionId) -> SessionResult<()> {
        if self.control(id)?.unpause() {
            debug!("{id}: resume requested");
        }
        Ok(())
    }

    /// Returns whether the session is paused afterwards.
    pub fn toggle_pause(&self, id: &SessionId) -> SessionResult<bool> {
        Ok(self.control(id)?.toggle_pause())
    }

    pub fn is_paused(&self, id: &SessionId) -> SessionResult<bool> {
        Ok(self.control(id)?.is_paused())
    }

    pub fn update_params(&self, id: &SessionId, change: ParamChange) -> SessionResult<()> {
        if change.is_empty() {
            return Ok(());
        }
        self.control(id)?.put_params(change)
    }

    /// Forward a key event and mark the session as active.
    pub fn record_input(&self, id: &SessionId, event: InputEvent) -> SessionResult<()> {
        self.reap_finished();
        let input = {
            let mut sessions = self.sessions();
            let slot = sessions
                .get_mut(id)
                .ok_or_else(|| ErrorKind::NotFound(id.clone()))?;
            slot.last_active = Instant::now();

            match &slot.state {
                SlotState::Running(running) => running.input.clone(),
                _ => return Err(ErrorKind::NotRunning(id.clone()).into()),
            }
        };

        input.send(event).map_err(|err| {
            warn!("{id}: dropped {} {}: {err}", event.key, event.pressed);
            SessionError::from(err)
        })
    }

    /// Remove sessions that saw no input within the idle timeout,
    /// along with sessions whose machine already stopped on its own.
    pub fn sweep_idle(&self) -> Vec<SessionId> {
        let ttl = self.inner.conf.idle_ttl();
        let now = Instant::now();

        let expired: Vec<SessionId> = self
            .sessions()
            .iter()
            .filter(|(id, slot)| {
                if slot.is_finished() {
                    info!("{id}: machine stopped on its own");
                    true
                } else if now.saturating_duration_since(slot.last_active) > ttl {
                    info!("{id}: idle for more than {}s", ttl.as_secs());
                    true
                } else {
                    false
                }
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            match self.stop(id) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => warn!("{id}: eviction failed: {err}"),
            }
        }

        expired
    }

    /// Run [`VmManager::sweep_idle`] periodically on a background thread.
    pub fn spawn_sweeper(&self) -> SessionResult<Sweeper> {
        let manager = self.clone();
        let interval = self.inner.conf.sweep_interval();
        let (shutdown, rx) = mpsc::channel::<()>();

        let task = thread::Builder::new()
            .name("session-sweeper".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let evicted = manager.sweep_idle();
                        if !evicted.is_empty() {
                            debug!("sweeper evicted {} sessions", evicted.len());
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Sweeper { shutdown, task })
    }

    /// Stop every session.
    pub fn shutdown(&self) {
        let ids = self.ids();
        info!("shutting down {} sessions", ids.len());

        for id in ids {
            if let Err(err) = self.stop(&id) {
                debug!("{id}: {err}");
            }
        }
    }
}

/// Handle to the background eviction thread.
///
/// Dropping the handle also ends the thread, without waiting for it.
pub struct Sweeper {
    shutdown: Sender<()>,
    task: JoinHandle<()>,
}

impl Sweeper {
    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
        if self.task.join().is_err() {
            error!("sweeper thread panicked");
        }
    }
}

/// Stop a session thread and wait for it to give back its sink.
fn halt(id: &SessionId, running: Running) -> Option<BoxedSink> {
    running.control.stop();
    match running.task.join() {
        Ok(sink) => Some(sink),
        Err(_) => {
            error!("{id}: session thread panicked");
            None
        }
    }
}

/// Tell a client it was not admitted and hang up.
fn reject(mut sink: BoxedSink, reason: impl ToString) {
    if let Err(err) = sink.send(Outbound::error(reason)) {
        debug!("rejection not delivered: {err}");
    }
    sink.close();
}
