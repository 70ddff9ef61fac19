//! HTTP request handlers

use super::AppContext;
use crate::error::Error;
use crate::playback::{ControllerStatus, PlayOutcome, SettingsChange};
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use subl_common::session::{ResumeSnapshot, VoiceSettings};
use tracing::{error, info, warn};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<StatusResponse>)>;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub url: String,
    #[serde(default)]
    pub frequency_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadResponse {
    pub duration_secs: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeekPosition {
    pub position_secs: f64,
}

#[derive(Debug, Deserialize)]
pub struct AffirmationsRequest {
    pub affirmations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionInfoRequest {
    #[serde(default)]
    pub music_track: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntitlementRequest {
    pub entitled: bool,
}

/// Partial mix update; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct MixUpdateRequest {
    pub music_volume: Option<f32>,
    pub frequency_volume: Option<f32>,
    pub affirmation_volume: Option<f32>,
    pub repetition_interval_secs: Option<f64>,
    pub affirmations_enabled: Option<bool>,
    pub repeat_session: Option<bool>,
}

impl MixUpdateRequest {
    fn into_changes(self) -> Vec<SettingsChange> {
        let mut changes = Vec::new();
        if let Some(v) = self.music_volume {
            changes.push(SettingsChange::MusicVolume(v));
        }
        if let Some(v) = self.frequency_volume {
            changes.push(SettingsChange::FrequencyVolume(v));
        }
        if let Some(v) = self.affirmation_volume {
            changes.push(SettingsChange::AffirmationVolume(v));
        }
        if let Some(v) = self.repetition_interval_secs {
            changes.push(SettingsChange::RepetitionInterval(v));
        }
        if let Some(v) = self.affirmations_enabled {
            changes.push(SettingsChange::AffirmationsEnabled(v));
        }
        if let Some(v) = self.repeat_session {
            changes.push(SettingsChange::RepeatSession(v));
        }
        changes
    }
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub resumed: bool,
    pub snapshot: Option<ResumeSnapshot>,
    pub duration_secs: Option<f64>,
}

fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) | Error::PlaybackRejected(_) | Error::Cancelled => StatusCode::CONFLICT,
        Error::Load { .. } | Error::Synthesis(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = error_status(&e);
    if status.is_server_error() || e.is_session_fatal() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "subl_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /playback/status
pub async fn status(State(ctx): State<AppContext>) -> ApiResult<ControllerStatus> {
    ctx.controller.status().await.map(Json).map_err(api_error)
}

/// POST /playback/load
pub async fn load(
    State(ctx): State<AppContext>,
    Json(req): Json<LoadRequest>,
) -> ApiResult<LoadResponse> {
    if req.url.trim().is_empty() {
        return Err(api_error(Error::InvalidInput("url must not be empty".to_string())));
    }
    info!(url = %req.url, "Load requested");
    let duration_secs = ctx
        .controller
        .load(req.url, req.frequency_url)
        .await
        .map_err(api_error)?;
    Ok(Json(LoadResponse { duration_secs }))
}

/// POST /playback/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> ApiResult<PlayOutcome> {
    ctx.controller.toggle_play().await.map(Json).map_err(api_error)
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> ApiResult<PlayOutcome> {
    ctx.controller.play().await.map(Json).map_err(api_error)
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.controller.pause().await.map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekPosition>,
) -> ApiResult<SeekPosition> {
    let position_secs = ctx.controller.seek(req.position_secs).await.map_err(api_error)?;
    Ok(Json(SeekPosition { position_secs }))
}

/// PUT /session/affirmations
pub async fn set_affirmations(
    State(ctx): State<AppContext>,
    Json(req): Json<AffirmationsRequest>,
) -> ApiResult<StatusResponse> {
    ctx.controller
        .update_settings(SettingsChange::Affirmations(req.affirmations))
        .await
        .map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// PUT /session/info
pub async fn set_session_info(
    State(ctx): State<AppContext>,
    Json(req): Json<SessionInfoRequest>,
) -> ApiResult<StatusResponse> {
    ctx.controller
        .update_settings(SettingsChange::SessionInfo {
            music_track: req.music_track,
            category: req.category,
        })
        .await
        .map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// PUT /session/entitlement
pub async fn set_entitlement(
    State(ctx): State<AppContext>,
    Json(req): Json<EntitlementRequest>,
) -> ApiResult<StatusResponse> {
    ctx.controller
        .set_entitlement(req.entitled)
        .await
        .map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /session/resume
///
/// Restores the session saved when the preview ended and loads its audio.
pub async fn resume(State(ctx): State<AppContext>) -> ApiResult<ResumeResponse> {
    let Some(snapshot) = ctx.controller.resume_pending().await.map_err(api_error)? else {
        return Ok(Json(ResumeResponse {
            resumed: false,
            snapshot: None,
            duration_secs: None,
        }));
    };

    let duration_secs = match snapshot.audio_url.clone() {
        Some(url) => {
            let status = ctx.controller.status().await.map_err(api_error)?;
            Some(
                ctx.controller
                    .load(url, status.frequency_url)
                    .await
                    .map_err(api_error)?,
            )
        }
        None => None,
    };

    Ok(Json(ResumeResponse {
        resumed: true,
        snapshot: Some(snapshot),
        duration_secs,
    }))
}

/// PUT /settings/voice
pub async fn set_voice(
    State(ctx): State<AppContext>,
    Json(voice): Json<VoiceSettings>,
) -> ApiResult<StatusResponse> {
    ctx.controller
        .update_settings(SettingsChange::Voice(voice))
        .await
        .map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// PUT /settings/mix
pub async fn update_mix(
    State(ctx): State<AppContext>,
    Json(req): Json<MixUpdateRequest>,
) -> ApiResult<StatusResponse> {
    for change in req.into_changes() {
        ctx.controller.update_settings(change).await.map_err(api_error)?;
    }
    Ok(StatusResponse::ok())
}
