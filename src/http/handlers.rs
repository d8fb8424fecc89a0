use super::state::AppState;
use crate::error::TriggerError;
use crate::nats::RecognitionEventMessage;
use crate::session::{
    Cookie, Detection, ModelHandle, Phrase, PhraseRecognitionConfig, PhraseRecognitionExtra,
    RecognitionConfig, SoundModel, SoundModelKind,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

/// Upper bound for a single buffered-audio read
const MAX_READ_BYTES: usize = 1 << 20;

/// Default buffered-audio read: 100ms of 16kHz mono PCM
const DEFAULT_READ_BYTES: usize = 3200;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub kind: SoundModelKind,

    /// Model identifier (generated if not provided)
    pub uuid: Option<Uuid>,

    pub vendor_uuid: Option<Uuid>,

    /// Base64-encoded model data
    pub data: String,

    #[serde(default)]
    pub phrases: Vec<Phrase>,
}

#[derive(Debug, Serialize)]
pub struct LoadModelResponse {
    pub handle: ModelHandle,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRecognitionRequest {
    pub capture_handle: i32,
    pub capture_device: u32,
    pub capture_requested: bool,
    pub phrases: Vec<PhraseRecognitionConfig>,
    /// Base64-encoded engine parameters
    pub data: Option<String>,
    /// Echoed back with every event
    pub cookie: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DetectRequest {
    pub phrases: Vec<PhraseRecognitionExtra>,
    pub capture_delay_ms: u32,
    pub capture_preamble_ms: u32,
    pub trigger_in_data: bool,
    /// Base64-encoded event data
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioQuery {
    pub bytes: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AudioResponse {
    pub handle: ModelHandle,
    pub bytes_read: usize,
    /// Base64-encoded little-endian 16-bit PCM
    pub pcm: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub handle: ModelHandle,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Negative errno, when the failure came from the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn status_for(e: &TriggerError) -> StatusCode {
    match e {
        TriggerError::NotFound(_) => StatusCode::NOT_FOUND,
        TriggerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        TriggerError::InvalidState { .. }
        | TriggerError::Busy { .. }
        | TriggerError::DuplicateHandle(_) => StatusCode::CONFLICT,
        TriggerError::SubsystemUnavailable(_) | TriggerError::NotOpen => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        TriggerError::IncompatibleVersion { .. }
        | TriggerError::QueryFailed(_)
        | TriggerError::SubsystemFailure(_)
        | TriggerError::HandlesExhausted => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn device_error(e: TriggerError) -> Response {
    (
        status_for(&e),
        Json(ErrorResponse {
            error: e.to_string(),
            errno: Some(e.errno()),
        }),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message,
            errno: None,
        }),
    )
        .into_response()
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, Response> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| bad_request(format!("{} is not valid base64: {}", field, e)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /properties
/// Decoded device properties
pub async fn get_properties(State(state): State<AppState>) -> impl IntoResponse {
    match state.hw.get_properties(state.device) {
        Ok(properties) => (StatusCode::OK, Json(properties)).into_response(),
        Err(e) => device_error(e),
    }
}

/// POST /models
/// Load a sound model into a new session
pub async fn load_model(
    State(state): State<AppState>,
    Json(req): Json<LoadModelRequest>,
) -> impl IntoResponse {
    let data = match decode_base64("data", &req.data) {
        Ok(data) => data,
        Err(response) => return response,
    };

    let model = SoundModel {
        kind: req.kind,
        uuid: req.uuid.unwrap_or_else(Uuid::new_v4),
        vendor_uuid: req.vendor_uuid.unwrap_or_else(Uuid::nil),
        data,
        phrases: req.phrases,
    };

    match state.hw.load_sound_model(state.device, model) {
        Ok(handle) => {
            info!("Loaded sound model {} over HTTP", handle);
            (
                StatusCode::CREATED,
                Json(LoadModelResponse {
                    handle,
                    status: "loaded".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => device_error(e),
    }
}

/// GET /models/:handle
/// Snapshot of a session
pub async fn get_model_state(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
) -> impl IntoResponse {
    match state.hw.get_model_state(state.device, ModelHandle(handle)) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => device_error(e),
    }
}

/// DELETE /models/:handle
/// Unload a sound model and drop its session
pub async fn unload_model(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
) -> impl IntoResponse {
    let handle = ModelHandle(handle);

    match state.hw.unload_sound_model(state.device, handle) {
        Ok(()) => {
            state.events.lock().remove(&handle);
            (
                StatusCode::OK,
                Json(StatusResponse {
                    handle,
                    status: "unloaded".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => device_error(e),
    }
}

/// POST /models/:handle/recognition/start
/// Arm recognition; events are recorded and forwarded to the publisher
pub async fn start_recognition(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
    Json(req): Json<StartRecognitionRequest>,
) -> impl IntoResponse {
    let handle = ModelHandle(handle);

    let data = match req.data.as_deref().map(|d| decode_base64("data", d)).transpose() {
        Ok(data) => data.unwrap_or_default(),
        Err(response) => return response,
    };

    let config = RecognitionConfig {
        capture_handle: req.capture_handle,
        capture_device: req.capture_device,
        capture_requested: req.capture_requested,
        phrases: req.phrases,
        data,
    };

    match state.hw.start_recognition(
        state.device,
        handle,
        config,
        state.recognition_callback(),
        Cookie(req.cookie),
    ) {
        Ok(()) => (
            StatusCode::OK,
            Json(StatusResponse {
                handle,
                status: "active".to_string(),
            }),
        )
            .into_response(),
        Err(e) => device_error(e),
    }
}

/// POST /models/:handle/recognition/stop
pub async fn stop_recognition(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
) -> impl IntoResponse {
    let handle = ModelHandle(handle);

    match state.hw.stop_recognition(state.device, handle) {
        Ok(()) => (
            StatusCode::OK,
            Json(StatusResponse {
                handle,
                status: "stopped".to_string(),
            }),
        )
            .into_response(),
        Err(e) => device_error(e),
    }
}

/// GET /models/:handle/events
/// Recognition events delivered so far
pub async fn get_events(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
) -> impl IntoResponse {
    let handle = ModelHandle(handle);

    if let Err(e) = state.hw.get_model_state(state.device, handle) {
        return device_error(e);
    }

    let events: Vec<RecognitionEventMessage> = state
        .events_for(handle)
        .iter()
        .map(RecognitionEventMessage::from)
        .collect();
    (StatusCode::OK, Json(events)).into_response()
}

/// GET /models/:handle/audio?bytes=N
/// Read captured audio from a buffering session
pub async fn read_audio(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
    Query(query): Query<AudioQuery>,
) -> impl IntoResponse {
    let handle = ModelHandle(handle);
    let len = query.bytes.unwrap_or(DEFAULT_READ_BYTES);
    if len > MAX_READ_BYTES {
        return bad_request(format!(
            "read of {} bytes exceeds the {} byte limit",
            len, MAX_READ_BYTES
        ));
    }

    let mut buf = vec![0u8; len];
    match state.hw.read_buffer(state.device, handle, &mut buf) {
        Ok(read) => (
            StatusCode::OK,
            Json(AudioResponse {
                handle,
                bytes_read: read,
                pcm: base64::engine::general_purpose::STANDARD.encode(&buf[..read]),
            }),
        )
            .into_response(),
        Err(e) => device_error(e),
    }
}

/// POST /models/:handle/simulate/detect
/// Inject a detection into the simulated subsystem
pub async fn simulate_detect(
    State(state): State<AppState>,
    Path(handle): Path<i32>,
    Json(req): Json<DetectRequest>,
) -> impl IntoResponse {
    let handle = ModelHandle(handle);

    let Some(simulator) = state.simulator.clone() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "detection injection requires the simulated subsystem".to_string(),
                errno: None,
            }),
        )
            .into_response();
    };

    let data = match req.data.as_deref().map(|d| decode_base64("data", d)).transpose() {
        Ok(data) => data.unwrap_or_default(),
        Err(response) => return response,
    };

    let detection = Detection {
        phrases: req.phrases,
        capture_delay_ms: req.capture_delay_ms,
        capture_preamble_ms: req.capture_preamble_ms,
        trigger_in_data: req.trigger_in_data,
        data,
    };

    if !simulator.detect(handle, detection) {
        error!("No recognition armed for model {}", handle);
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("no recognition armed for model {}", handle),
                errno: None,
            }),
        )
            .into_response();
    }

    match state.hw.get_model_state(state.device, handle) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => device_error(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
