// Integration tests for the device coordinator
//
// Open/close reference counting, version negotiation, handle allocation,
// event routing and the end-to-end detection flow against the simulated
// subsystem.

use parking_lot::Mutex;
use sound_trigger_hal::config::DeviceConfig;
use sound_trigger_hal::device::LEGACY_API_VERSION;
use sound_trigger_hal::subsystem::{CaptureNotice, FailOp, SubsystemEvent};
use sound_trigger_hal::{
    ApiVersion, AudioSubsystem, Cookie, Detection, DeviceCoordinator, ModelHandle, Properties,
    RecognitionCallback, RecognitionConfig, RecognitionEvent, RecognitionStatus, Session,
    SessionState, SimulatedConfig, SimulatedSubsystem, SoundModel, TriggerError,
    CORE_API_VERSION,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

type Delivered = Arc<Mutex<Vec<(RecognitionEvent, Cookie)>>>;

fn setup_with(
    config: SimulatedConfig,
    device: DeviceConfig,
) -> (Arc<SimulatedSubsystem>, Arc<DeviceCoordinator>) {
    let sim = Arc::new(SimulatedSubsystem::new(config));
    let coordinator = Arc::new(DeviceCoordinator::new(
        Arc::clone(&sim) as Arc<dyn AudioSubsystem>,
        device,
    ));
    (sim, coordinator)
}

fn setup() -> (Arc<SimulatedSubsystem>, Arc<DeviceCoordinator>) {
    setup_with(SimulatedConfig::default(), DeviceConfig::default())
}

fn model() -> SoundModel {
    SoundModel::generic(vec![1, 2, 3, 4])
}

fn recorder() -> (RecognitionCallback, Delivered) {
    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let callback: RecognitionCallback = Arc::new(move |event: &RecognitionEvent, cookie: Cookie| {
        sink.lock().push((event.clone(), cookie));
    });
    (callback, delivered)
}

#[test]
fn test_open_is_reference_counted() {
    let (sim, coordinator) = setup();

    let first = coordinator.open().unwrap();
    let second = coordinator.open().unwrap();

    assert_eq!(first, second);
    assert_eq!(coordinator.ref_count(), 2);
    assert_eq!(sim.bind_count(), 1);

    coordinator.close(first).unwrap();
    assert!(coordinator.is_open());
    coordinator.close(second).unwrap();
    assert!(!coordinator.is_open());

    assert_eq!(coordinator.close(first).unwrap_err(), TriggerError::NotOpen);
}

#[test]
fn test_operations_require_open_device() {
    let (_sim, coordinator) = setup();

    assert_eq!(
        coordinator.load_model(model()).unwrap_err(),
        TriggerError::NotOpen
    );
    assert_eq!(coordinator.properties().unwrap_err(), TriggerError::NotOpen);
}

#[test]
fn test_foreign_device_handle_is_rejected() {
    let (_sim, coordinator) = setup();
    let (_other_sim, other) = setup();
    let foreign = other.open().unwrap();

    coordinator.open().unwrap();
    assert!(matches!(
        coordinator.close(foreign),
        Err(TriggerError::InvalidArgument(_))
    ));
    assert_eq!(coordinator.ref_count(), 1);
}

#[test]
fn test_version_negotiation() {
    let (_sim, coordinator) = setup_with(
        SimulatedConfig {
            api_version: Some(ApiVersion::new(1, 4)),
            ..SimulatedConfig::default()
        },
        DeviceConfig::default(),
    );

    coordinator.open().unwrap();
    assert_eq!(coordinator.api_version(), Some(ApiVersion::new(1, 4)));
}

#[test]
fn test_major_version_mismatch_fails_open() {
    let (sim, coordinator) = setup_with(
        SimulatedConfig {
            api_version: Some(ApiVersion::new(2, 0)),
            ..SimulatedConfig::default()
        },
        DeviceConfig::default(),
    );

    let err = coordinator.open().unwrap_err();
    assert_eq!(
        err,
        TriggerError::IncompatibleVersion {
            core: CORE_API_VERSION,
            subsystem: ApiVersion::new(2, 0),
        }
    );
    assert!(!coordinator.is_open());
    assert!(!sim.is_bound());
    assert_eq!(coordinator.api_version(), None);
}

#[test]
fn test_legacy_subsystem_without_version() {
    let (_sim, coordinator) = setup_with(
        SimulatedConfig {
            api_version: None,
            ..SimulatedConfig::default()
        },
        DeviceConfig::default(),
    );

    coordinator.open().unwrap();
    assert_eq!(coordinator.api_version(), Some(LEGACY_API_VERSION));
}

#[test]
fn test_bind_failure_is_subsystem_unavailable() {
    let (sim, coordinator) = setup();
    sim.set_failure(FailOp::Bind, true);

    assert!(matches!(
        coordinator.open(),
        Err(TriggerError::SubsystemUnavailable(_))
    ));
    assert_eq!(coordinator.ref_count(), 0);

    sim.set_failure(FailOp::Bind, false);
    coordinator.open().unwrap();
    assert_eq!(coordinator.ref_count(), 1);
}

#[test]
fn test_properties_query() {
    let properties = Properties {
        implementor: "Acme".to_string(),
        max_sound_models: 4,
        ..Properties::default()
    };
    let (sim, coordinator) = setup_with(
        SimulatedConfig {
            properties: properties.clone(),
            ..SimulatedConfig::default()
        },
        DeviceConfig::default(),
    );
    coordinator.open().unwrap();

    assert_eq!(coordinator.properties().unwrap(), properties);

    // Vendor extension past the fixed layout is ignored
    sim.set_properties_len(Some(Properties::WIRE_SIZE + 32));
    assert_eq!(coordinator.properties().unwrap(), properties);

    sim.set_properties_len(Some(100));
    assert!(matches!(
        coordinator.properties(),
        Err(TriggerError::QueryFailed(_))
    ));
}

#[test]
fn test_handles_are_unique_and_increasing() {
    let (_sim, coordinator) = setup();
    coordinator.open().unwrap();

    let handles: Vec<_> = (0..3)
        .map(|_| coordinator.load_model(model()).unwrap())
        .collect();

    assert_eq!(handles, vec![ModelHandle(1), ModelHandle(2), ModelHandle(3)]);
    assert_eq!(coordinator.registry().len(), 3);

    // Handles are never reused after unload
    coordinator.unload_model(ModelHandle(3)).unwrap();
    assert_eq!(coordinator.load_model(model()).unwrap(), ModelHandle(4));
}

#[test]
fn test_concurrent_loads_get_distinct_handles() {
    let (_sim, coordinator) = setup();
    coordinator.open().unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                (0..25)
                    .map(|_| coordinator.load_model(model()).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for worker in workers {
        for handle in worker.join().unwrap() {
            assert!(seen.insert(handle), "handle {} issued twice", handle);
        }
    }

    assert_eq!(seen.len(), 200);
    assert_eq!(coordinator.registry().len(), 200);
}

#[test]
fn test_failed_load_is_not_registered() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    sim.set_failure(FailOp::OpenStream, true);

    assert!(matches!(
        coordinator.load_model(model()),
        Err(TriggerError::SubsystemFailure(_))
    ));
    assert!(coordinator.registry().is_empty());

    assert!(matches!(
        coordinator.load_model(SoundModel::generic(Vec::new())),
        Err(TriggerError::InvalidArgument(_))
    ));
    assert!(coordinator.registry().is_empty());
}

#[test]
fn test_unknown_handle_is_not_found() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let loaded = coordinator.load_model(model()).unwrap();
    let (callback, _) = recorder();
    let missing = ModelHandle(77);

    assert_eq!(coordinator.registry().len(), 1);
    assert_eq!(
        coordinator.unload_model(missing).unwrap_err(),
        TriggerError::NotFound(missing)
    );
    assert_eq!(coordinator.registry().len(), 1);
    assert!(coordinator.registry().contains(loaded));
    assert_eq!(sim.open_streams(), 1);
    assert_eq!(
        coordinator
            .start_recognition(missing, RecognitionConfig::default(), callback, Cookie(1))
            .unwrap_err(),
        TriggerError::NotFound(missing)
    );
    assert_eq!(
        coordinator.stop_recognition(missing).unwrap_err(),
        TriggerError::NotFound(missing)
    );
    assert_eq!(
        coordinator.model_state(missing).unwrap_err(),
        TriggerError::NotFound(missing)
    );
}

#[test]
fn test_unload_leaves_a_session_without_model_registered() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();

    // Registered but not yet loaded, the window a racing load would open
    let handle = ModelHandle(500);
    let session = coordinator
        .registry()
        .register(Session::new(
            handle,
            Arc::clone(&sim) as Arc<dyn AudioSubsystem>,
        ))
        .unwrap();

    assert!(matches!(
        coordinator.unload_model(handle),
        Err(TriggerError::InvalidState {
            state: SessionState::Idle,
            ..
        })
    ));
    assert!(coordinator.registry().contains(handle));

    session.load_sound_model(model()).unwrap();
    drop(session);
    assert_eq!(
        coordinator.model_state(handle).unwrap().state,
        SessionState::Loaded
    );

    coordinator.unload_model(handle).unwrap();
    assert!(coordinator.registry().is_empty());
    assert_eq!(sim.open_streams(), 0);
}

#[test]
fn test_concurrent_load_and_unload_leak_no_streams() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let unloader = {
        let coordinator = Arc::clone(&coordinator);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut unloaded = HashSet::new();
            while !done.load(Ordering::Acquire) {
                for handle in coordinator.registry().handles() {
                    if coordinator.unload_model(handle).is_ok() {
                        unloaded.insert(handle);
                    }
                }
            }
            unloaded
        })
    };

    let mut loaded = HashSet::new();
    for _ in 0..200 {
        loaded.insert(coordinator.load_model(model()).unwrap());
    }
    done.store(true, Ordering::Release);
    let unloaded = unloader.join().unwrap();

    // Every handle handed out is either still usable or was unloaded once
    for handle in &loaded {
        assert_ne!(
            coordinator.registry().contains(*handle),
            unloaded.contains(handle)
        );
    }
    assert_eq!(loaded.len(), coordinator.registry().len() + unloaded.len());
    assert_eq!(sim.open_streams(), coordinator.registry().len());
}

#[test]
fn test_dropped_coordinator_closes_streams() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();
    let (callback, _) = recorder();
    coordinator
        .start_recognition(handle, RecognitionConfig::default(), callback, Cookie(1))
        .unwrap();
    assert_eq!(sim.open_streams(), 1);

    drop(coordinator);

    assert!(!sim.is_armed(handle));
    assert_eq!(sim.open_streams(), 0);
}

#[test]
fn test_end_to_end_detection() {
    let (sim, coordinator) = setup();
    let device = coordinator.open().unwrap();

    let handle = coordinator.load_model(model()).unwrap();
    let (callback, delivered) = recorder();
    coordinator
        .start_recognition(
            handle,
            RecognitionConfig::default(),
            callback,
            Cookie(0xFEED),
        )
        .unwrap();

    assert!(sim.detect(handle, Detection::default()));

    {
        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0.status, RecognitionStatus::Success);
        assert_eq!(delivered[0].0.model, handle);
        assert_eq!(delivered[0].1, Cookie(0xFEED));
    }
    assert_eq!(
        coordinator.model_state(handle).unwrap().state,
        SessionState::Detected
    );

    coordinator.stop_recognition(handle).unwrap();
    coordinator.unload_model(handle).unwrap();
    assert!(coordinator.session(handle).is_none());

    coordinator.close(device).unwrap();
    assert_eq!(delivered.lock().len(), 1);
}

#[test]
fn test_detection_on_engine_thread() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();
    let (callback, delivered) = recorder();
    coordinator
        .start_recognition(handle, RecognitionConfig::default(), callback, Cookie(1))
        .unwrap();

    assert!(sim.spawn_detect(handle, Detection::default()).join().unwrap());
    assert_eq!(delivered.lock().len(), 1);
}

#[test]
fn test_buffered_audio_read() {
    let (sim, coordinator) = setup_with(
        SimulatedConfig {
            capture: vec![1, -2, 300],
            ..SimulatedConfig::default()
        },
        DeviceConfig::default(),
    );
    coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();
    let (callback, _) = recorder();
    let config = RecognitionConfig {
        capture_requested: true,
        ..RecognitionConfig::default()
    };
    coordinator
        .start_recognition(handle, config, callback, Cookie(1))
        .unwrap();

    let mut buf = [0u8; 16];
    assert!(matches!(
        coordinator.read_buffer(handle, &mut buf),
        Err(TriggerError::InvalidState { .. })
    ));

    assert!(sim.detect(handle, Detection::default()));
    assert_eq!(
        coordinator.model_state(handle).unwrap().state,
        SessionState::Buffering
    );

    let mut buf = [0u8; 5];
    assert_eq!(coordinator.read_buffer(handle, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], &[1, 0, 0xfe, 0xff]);

    let mut buf = [0u8; 16];
    assert_eq!(coordinator.read_buffer(handle, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], &300i16.to_le_bytes());
    assert_eq!(coordinator.read_buffer(handle, &mut buf).unwrap(), 0);

    assert!(sim.complete_buffering(handle));
    assert_eq!(
        coordinator.model_state(handle).unwrap().state,
        SessionState::Stopped
    );
}

#[test]
fn test_late_event_after_unload_is_dropped() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();
    let (callback, delivered) = recorder();
    coordinator
        .start_recognition(handle, RecognitionConfig::default(), callback, Cookie(1))
        .unwrap();

    coordinator.unload_model(handle).unwrap();

    // The sink still exists; the event targets a handle nobody owns anymore
    assert!(sim.emit(SubsystemEvent::Detected {
        model: handle,
        detection: Detection::default(),
    }));
    assert!(sim.emit(SubsystemEvent::Aborted { model: handle }));
    assert!(delivered.lock().is_empty());
}

#[test]
fn test_event_for_other_handle_is_not_misrouted() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let first = coordinator.load_model(model()).unwrap();
    let second = coordinator.load_model(model()).unwrap();

    let (first_cb, first_events) = recorder();
    let (second_cb, second_events) = recorder();
    coordinator
        .start_recognition(first, RecognitionConfig::default(), first_cb, Cookie(1))
        .unwrap();
    coordinator
        .start_recognition(second, RecognitionConfig::default(), second_cb, Cookie(2))
        .unwrap();

    assert!(sim.detect(second, Detection::default()));

    assert!(first_events.lock().is_empty());
    assert_eq!(second_events.lock().len(), 1);
    assert_eq!(second_events.lock()[0].1, Cookie(2));
}

#[test]
fn test_abort_through_coordinator() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();
    let (callback, delivered) = recorder();
    coordinator
        .start_recognition(handle, RecognitionConfig::default(), callback, Cookie(1))
        .unwrap();

    assert!(sim.abort(handle));

    assert_eq!(delivered.lock()[0].0.status, RecognitionStatus::Abort);
    assert_eq!(
        coordinator.model_state(handle).unwrap().state,
        SessionState::Stopped
    );
    assert!(!sim.is_armed(handle));
}

#[test]
fn test_unload_waits_for_inflight_callback() {
    let (sim, coordinator) = setup();
    coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let callback: RecognitionCallback = Arc::new(move |_event: &RecognitionEvent, _cookie: Cookie| {
        entered_tx.send(()).unwrap();
        release_rx.lock().recv().unwrap();
    });
    coordinator
        .start_recognition(handle, RecognitionConfig::default(), callback, Cookie(1))
        .unwrap();

    let engine = sim.spawn_detect(handle, Detection::default());
    entered_rx.recv().unwrap();

    let unloaded = Arc::new(AtomicBool::new(false));
    let unloader = {
        let coordinator = Arc::clone(&coordinator);
        let unloaded = Arc::clone(&unloaded);
        thread::spawn(move || {
            let result = coordinator.unload_model(handle);
            unloaded.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!unloaded.load(Ordering::SeqCst));

    release_tx.send(()).unwrap();
    assert!(engine.join().unwrap());
    unloader.join().unwrap().unwrap();
    assert!(coordinator.session(handle).is_none());
}

#[test]
fn test_close_keeps_sessions_by_default() {
    let (sim, coordinator) = setup();
    let device = coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();

    coordinator.close(device).unwrap();

    assert!(coordinator.session(handle).is_some());
    assert!(sim.is_bound());
    assert_eq!(coordinator.api_version(), Some(CORE_API_VERSION));

    coordinator.open().unwrap();
    assert_eq!(sim.bind_count(), 1);
    assert_eq!(
        coordinator.model_state(handle).unwrap().state,
        SessionState::Loaded
    );
}

#[test]
fn test_release_on_last_close() {
    let (sim, coordinator) = setup_with(
        SimulatedConfig::default(),
        DeviceConfig {
            release_on_last_close: true,
        },
    );
    let device = coordinator.open().unwrap();
    let handle = coordinator.load_model(model()).unwrap();
    let (callback, _) = recorder();
    coordinator
        .start_recognition(handle, RecognitionConfig::default(), callback, Cookie(1))
        .unwrap();

    coordinator.close(device).unwrap();

    assert!(coordinator.registry().is_empty());
    assert!(!sim.is_bound());
    assert_eq!(sim.open_streams(), 0);
    assert_eq!(coordinator.api_version(), None);
    assert!(sim
        .notices()
        .contains(&(handle, CaptureNotice::Deregistered)));

    coordinator.open().unwrap();
    assert_eq!(sim.bind_count(), 2);
    assert_eq!(coordinator.api_version(), Some(CORE_API_VERSION));
}
