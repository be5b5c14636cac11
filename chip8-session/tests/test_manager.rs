use std::{
    num::NonZeroU32,
    sync::mpsc::{Receiver, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use chip8::KeyCode;
use chip8_session::{
    ChannelSink, ErrorKind, FrameSink, InputEvent, ManagerConf, Outbound, ParamChange, Rom,
    SessionId, SinkError, VmManager, CAPACITY_MESSAGE,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn nz(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap()
}

/// JP 0x200
fn idle_rom() -> Rom {
    Rom::new(vec![0x12, 0x00], nz(100), nz(1))
}

/// Waits for a key, then draws its font glyph in the top left corner.
fn echo_key_rom() -> Rom {
    Rom::new(
        vec![
            0xF1, 0x0A, // LD V1, K
            0xF1, 0x29, // LD F, V1
            0xD0, 0x05, // DRW V0, V0, 5
            0x12, 0x06, // JP 0x206
        ],
        nz(100),
        nz(4),
    )
}

/// Client that takes a long time to accept its acknowledgement.
struct SlowSink {
    inner: ChannelSink,
    delay: Duration,
}

impl FrameSink for SlowSink {
    fn send(&mut self, message: Outbound) -> Result<(), SinkError> {
        if matches!(message, Outbound::Started { .. }) {
            thread::sleep(self.delay);
        }
        self.inner.send(message)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

fn manager(conf: ManagerConf) -> VmManager {
    VmManager::new(conf)
}

/// Receive messages until one matches, or the timeout elapses.
fn wait_for(rx: &Receiver<Outbound>, pred: impl Fn(&Outbound) -> bool) -> Option<Outbound> {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(msg) if pred(&msg) => return Some(msg),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

fn is_frame(msg: &Outbound) -> bool {
    matches!(msg, Outbound::Frame { .. })
}

fn is_lit_frame(msg: &Outbound) -> bool {
    matches!(msg, Outbound::Frame { frame } if frame.iter().any(|px| *px != 0))
}

/// Read until the sender side hangs up.
fn wait_closed(rx: &Receiver<Outbound>) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

#[test]
fn test_start_acknowledges_then_streams() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();

    let id = manager.start(&idle_rom(), sink).unwrap();

    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Outbound::Started {
            session_id: id.clone()
        }
    );
    match wait_for(&rx, is_frame) {
        Some(Outbound::Frame { frame }) => {
            assert_eq!(frame.len(), 64 * 32);
            assert!(frame.iter().all(|px| *px == 0));
        }
        other => panic!("expected frame, got {other:?}"),
    }

    manager.shutdown();
}

#[test]
fn test_admission_limit() {
    let manager = manager(ManagerConf {
        max_sessions: 2,
        ..ManagerConf::default()
    });

    let mut receivers = Vec::new();
    for _ in 0..2 {
        let (sink, rx) = ChannelSink::new();
        manager.start(&idle_rom(), sink).unwrap();
        receivers.push(rx);
    }

    let (sink, rx) = ChannelSink::new();
    let err = manager.start(&idle_rom(), sink).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CapacityReached { max_sessions: 2 }));

    // The rejected client is told why, then disconnected.
    assert_eq!(rx.recv().unwrap(), Outbound::error(CAPACITY_MESSAGE));
    assert!(rx.recv().is_err());
    assert_eq!(manager.len(), 2);

    // Freeing a slot admits the next client.
    let first = manager.ids().remove(0);
    manager.stop(&first).unwrap();
    let (sink, _rx) = ChannelSink::new();
    manager.start(&idle_rom(), sink).unwrap();
    assert_eq!(manager.stats().current_sessions, 2);

    manager.shutdown();
}

#[test]
fn test_unknown_session() {
    let manager = manager(ManagerConf::default());
    let id = SessionId::new("missing");

    assert!(manager.stop(&id).unwrap_err().is_not_found());
    assert!(manager.pause(&id).unwrap_err().is_not_found());
    assert!(manager.unpause(&id).unwrap_err().is_not_found());
    assert!(manager.is_paused(&id).unwrap_err().is_not_found());
    assert!(manager.unload(&id).unwrap_err().is_not_found());
    assert!(manager
        .record_input(&id, InputEvent::new(KeyCode::Key1, true))
        .unwrap_err()
        .is_not_found());
    assert!(manager
        .update_params(
            &id,
            ParamChange {
                frame_rate: Some(nz(30)),
                cycles_per_frame: None,
            }
        )
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_stop_closes_sink() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();
    assert!(wait_for(&rx, is_frame).is_some());

    manager.stop(&id).unwrap();

    assert!(!manager.contains(&id));
    assert!(wait_closed(&rx));
    assert!(manager.stop(&id).unwrap_err().is_not_found());
}

#[test]
fn test_pause_halts_frames() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();
    assert!(wait_for(&rx, is_frame).is_some());

    manager.pause(&id).unwrap();
    assert!(manager.is_paused(&id).unwrap());

    // At most one frame was in flight when the pause landed.
    thread::sleep(Duration::from_millis(50));
    while rx.try_recv().is_ok() {}
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    manager.unpause(&id).unwrap();
    assert!(!manager.is_paused(&id).unwrap());
    assert!(wait_for(&rx, is_frame).is_some());

    assert!(manager.toggle_pause(&id).unwrap());
    assert!(!manager.toggle_pause(&id).unwrap());

    manager.shutdown();
}

#[test]
fn test_input_reaches_machine() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&echo_key_rom(), sink).unwrap();

    // Nothing is drawn until a key is down.
    match wait_for(&rx, is_frame) {
        Some(msg) => assert!(!is_lit_frame(&msg)),
        None => panic!("no frame"),
    }

    manager
        .record_input(&id, InputEvent::new(KeyCode::Key1, true))
        .unwrap();
    assert!(wait_for(&rx, is_lit_frame).is_some());

    manager.shutdown();
}

#[test]
fn test_update_params() {
    let manager = manager(ManagerConf::default());
    let (sink, _rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();

    manager.update_params(&id, ParamChange::default()).unwrap();
    manager
        .update_params(
            &id,
            ParamChange {
                frame_rate: Some(nz(30)),
                cycles_per_frame: Some(nz(50)),
            },
        )
        .unwrap();

    manager.shutdown();
}

#[test]
fn test_idle_sessions_evicted() {
    let manager = manager(ManagerConf {
        idle_ttl_secs: 0,
        ..ManagerConf::default()
    });
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();

    thread::sleep(Duration::from_millis(10));
    let evicted = manager.sweep_idle();

    assert_eq!(evicted, vec![id.clone()]);
    assert!(!manager.contains(&id));
    assert!(wait_closed(&rx));
}

#[test]
fn test_active_sessions_kept() {
    let manager = manager(ManagerConf::default());
    let (sink, _rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();

    manager
        .record_input(&id, InputEvent::new(KeyCode::Key5, true))
        .unwrap();
    assert!(manager.sweep_idle().is_empty());
    assert!(manager.contains(&id));

    manager.shutdown();
}

#[test]
fn test_sweeper_thread() {
    let manager = manager(ManagerConf {
        idle_ttl_secs: 0,
        sweep_interval_secs: 0,
        ..ManagerConf::default()
    });
    let sweeper = manager.spawn_sweeper().unwrap();

    let (sink, rx) = ChannelSink::new();
    manager.start(&idle_rom(), sink).unwrap();

    assert!(wait_closed(&rx));
    assert!(manager.is_empty());

    sweeper.shutdown();
}

#[test]
fn test_unload_keeps_session() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();
    assert!(wait_for(&rx, is_frame).is_some());

    manager.unload(&id).unwrap();

    assert!(manager.contains(&id));
    assert!(matches!(
        manager.pause(&id).unwrap_err().kind,
        ErrorKind::NotRunning(_)
    ));
    assert!(matches!(
        manager
            .record_input(&id, InputEvent::new(KeyCode::Key1, true))
            .unwrap_err()
            .kind,
        ErrorKind::NotRunning(_)
    ));

    // No more frames, but the client is still connected.
    while rx.try_recv().is_ok() {}
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Timeout)
    );

    manager.stop(&id).unwrap();
    assert!(wait_closed(&rx));
}

#[test]
fn test_change_rom() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();
    assert!(wait_for(&rx, is_frame).is_some());

    // Rejected programs leave the old one running.
    let huge = Rom::new(vec![0; 0x1000], nz(60), nz(1));
    let err = manager.change_rom(&id, &huge).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Chip8(_)));
    assert!(!manager.is_paused(&id).unwrap());

    manager.change_rom(&id, &echo_key_rom()).unwrap();

    // Same client channel, acknowledged again.
    let started = wait_for(&rx, |msg| matches!(msg, Outbound::Started { .. }));
    assert_eq!(
        started,
        Some(Outbound::Started {
            session_id: id.clone()
        })
    );

    manager
        .record_input(&id, InputEvent::new(KeyCode::KeyF, true))
        .unwrap();
    assert!(wait_for(&rx, is_lit_frame).is_some());

    manager.shutdown();
    assert!(wait_closed(&rx));
}

#[test]
fn test_change_rom_after_unload() {
    let manager = manager(ManagerConf::default());
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();

    manager.unload(&id).unwrap();
    manager.change_rom(&id, &idle_rom()).unwrap();

    assert!(!manager.is_paused(&id).unwrap());
    assert!(wait_for(&rx, |msg| matches!(msg, Outbound::Started { .. })).is_some());
    assert!(wait_for(&rx, is_frame).is_some());

    manager.shutdown();
}

#[test]
fn test_slow_client_does_not_block_registry() {
    let manager = manager(ManagerConf::default());
    let (inner, _rx) = ChannelSink::new();
    let sink = SlowSink {
        inner,
        delay: Duration::from_millis(500),
    };

    let starter = {
        let manager = manager.clone();
        thread::spawn(move || manager.start(&idle_rom(), sink))
    };

    // Let the starter reach the acknowledgement.
    thread::sleep(Duration::from_millis(100));
    let before = Instant::now();
    assert!(manager.len() <= 1);
    assert!(before.elapsed() < Duration::from_millis(250));

    let id = starter.join().unwrap().unwrap();
    assert!(manager.contains(&id));

    manager.shutdown();
}

#[test]
fn test_dead_session_frees_slot() {
    let manager = manager(ManagerConf {
        max_sessions: 1,
        ..ManagerConf::default()
    });

    // The client hangs up, so the first frame fails and the session ends.
    let (sink, rx) = ChannelSink::new();
    let id = manager.start(&idle_rom(), sink).unwrap();
    drop(rx);

    let deadline = Instant::now() + TIMEOUT;
    while manager.contains(&id) {
        assert!(Instant::now() < deadline, "dead session still registered");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(manager.pause(&id).unwrap_err().is_not_found());

    // No sweep ran, yet the slot is free again.
    let (sink, _rx) = ChannelSink::new();
    manager.start(&idle_rom(), sink).unwrap();
    assert_eq!(manager.len(), 1);

    manager.shutdown();
}
