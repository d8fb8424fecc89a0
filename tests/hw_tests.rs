// Integration tests for the host-facing control surface and its status codes

use sound_trigger_hal::config::DeviceConfig;
use sound_trigger_hal::error::status_code;
use sound_trigger_hal::subsystem::{FailOp, SubsystemEvent};
use sound_trigger_hal::{
    hw_module, AudioSubsystem, Cookie, Detection, DeviceCoordinator, ModelHandle,
    RecognitionCallback, RecognitionConfig, RecognitionEvent, Session, SessionRegistry,
    SessionState, SimulatedConfig, SimulatedSubsystem, SoundModel, SoundTriggerHw, TriggerError,
    SOUND_TRIGGER_HARDWARE_INTERFACE,
};
use std::sync::Arc;

fn setup() -> (Arc<SimulatedSubsystem>, SoundTriggerHw) {
    let sim = Arc::new(SimulatedSubsystem::new(SimulatedConfig::default()));
    let coordinator = Arc::new(DeviceCoordinator::new(
        Arc::clone(&sim) as Arc<dyn AudioSubsystem>,
        DeviceConfig::default(),
    ));
    (sim, hw_module(coordinator))
}

fn noop_callback() -> RecognitionCallback {
    Arc::new(|_event: &RecognitionEvent, _cookie: Cookie| {})
}

#[test]
fn test_open_requires_interface_name() {
    let (_sim, hw) = setup();

    let result = hw.open("audio_hw_if");
    assert!(matches!(result, Err(TriggerError::InvalidArgument(_))));
    assert_eq!(status_code(&result), -libc::EINVAL);
    assert!(!hw.coordinator().is_open());

    let result = hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE);
    assert_eq!(status_code(&result), 0);
    assert!(hw.coordinator().is_open());
}

#[test]
fn test_status_codes_for_device_failures() {
    let (sim, hw) = setup();
    let device = hw.coordinator().device_handle();

    // Not opened yet
    assert_eq!(
        status_code(&hw.load_sound_model(device, SoundModel::generic(vec![1]))),
        -libc::ENODEV
    );
    assert_eq!(status_code(&hw.close(device)), -libc::ENODEV);

    sim.set_failure(FailOp::Bind, true);
    assert_eq!(
        status_code(&hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE)),
        -libc::ENODEV
    );
}

#[test]
fn test_status_codes_for_session_failures() {
    let (sim, hw) = setup();
    let device = hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE).unwrap();

    assert_eq!(
        status_code(&hw.load_sound_model(device, SoundModel::generic(Vec::new()))),
        -libc::EINVAL
    );
    assert_eq!(
        status_code(&hw.unload_sound_model(device, ModelHandle(99))),
        -libc::ENOENT
    );

    let handle = hw
        .load_sound_model(device, SoundModel::generic(vec![1, 2]))
        .unwrap();
    assert_eq!(
        status_code(&hw.stop_recognition(device, handle)),
        -libc::EPERM
    );

    let config = RecognitionConfig {
        capture_requested: true,
        ..RecognitionConfig::default()
    };
    hw.start_recognition(device, handle, config, noop_callback(), Cookie(1))
        .unwrap();
    assert!(sim.detect(handle, Detection::default()));
    assert_eq!(
        hw.get_model_state(device, handle).unwrap().state,
        SessionState::Buffering
    );
    assert_eq!(
        status_code(&hw.unload_sound_model(device, handle)),
        -libc::EBUSY
    );

    sim.set_failure(FailOp::DeregisterRecognition, true);
    assert_eq!(
        status_code(&hw.stop_recognition(device, handle)),
        -libc::EIO
    );
}

#[test]
fn test_duplicate_handle_status_code() {
    let sim = SimulatedSubsystem::new(SimulatedConfig::default());
    sim.bind(Arc::new(|_event: SubsystemEvent| {})).unwrap();
    let subsystem: Arc<dyn AudioSubsystem> = Arc::new(sim);

    let registry = SessionRegistry::new();
    registry
        .register(Session::new(ModelHandle(1), Arc::clone(&subsystem)))
        .unwrap();
    let result = registry.register(Session::new(ModelHandle(1), subsystem));

    assert_eq!(status_code(&result), -libc::EEXIST);
}

#[test]
fn test_properties_short_structure_is_eio() {
    let (sim, hw) = setup();
    let device = hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE).unwrap();

    assert_eq!(
        hw.get_properties(device).unwrap().max_sound_models,
        SimulatedConfig::default().properties.max_sound_models
    );

    sim.set_properties_len(Some(16));
    assert_eq!(status_code(&hw.get_properties(device)), -libc::EIO);
}

#[test]
fn test_foreign_device_handle_is_einval() {
    let (_sim, hw) = setup();
    let (_other_sim, other) = setup();
    hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE).unwrap();
    let foreign = other.open(SOUND_TRIGGER_HARDWARE_INTERFACE).unwrap();

    assert_eq!(status_code(&hw.get_properties(foreign)), -libc::EINVAL);
    assert_eq!(
        status_code(&hw.read_buffer(foreign, ModelHandle(1), &mut [0u8; 4])),
        -libc::EINVAL
    );
}

#[test]
fn test_full_cycle_returns_zero_codes() {
    let (sim, hw) = setup();
    let device = hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE).unwrap();

    let handle = hw
        .load_sound_model(device, SoundModel::generic(vec![9; 8]))
        .unwrap();
    assert_eq!(
        status_code(&hw.start_recognition(
            device,
            handle,
            RecognitionConfig::default(),
            noop_callback(),
            Cookie(5)
        )),
        0
    );
    assert!(sim.detect(handle, Detection::default()));
    assert_eq!(status_code(&hw.stop_recognition(device, handle)), 0);
    assert_eq!(status_code(&hw.unload_sound_model(device, handle)), 0);
    assert_eq!(status_code(&hw.close(device)), 0);
}
