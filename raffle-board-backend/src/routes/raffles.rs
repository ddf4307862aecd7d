use http::{Response, StatusCode};
use raffle_board_lifecycle::{NewRaffle, RaffleId, RaffleUpdate, SlotStatus, MAX_ACTIVE_RAFFLES};
use serde::{Deserialize, Serialize};

use super::json_response;
use crate::error::AppError;
use crate::{AppState, ResponseBody};

#[derive(Deserialize)]
pub struct SlotPayload {
    #[serde(default)]
    pub participant_name: String,
    pub status: SlotStatus,
}

#[derive(Deserialize)]
pub struct FinalizePayload {
    pub winner_slot_number: i64,
}

#[derive(Serialize)]
struct Created {
    id: RaffleId,
}

#[derive(Serialize)]
struct ActiveCount {
    active: u64,
    limit: u64,
}

pub async fn list(state: &AppState, token: &str) -> Result<Response<ResponseBody>, AppError> {
    let raffles = state.engine.list_my_raffles(token).await?;
    json_response(StatusCode::OK, &raffles)
}

pub async fn create(
    state: &AppState,
    token: &str,
    input: NewRaffle,
) -> Result<Response<ResponseBody>, AppError> {
    let id = state.engine.create_raffle(token, input).await?;
    json_response(StatusCode::CREATED, &Created { id })
}

pub async fn active_count(
    state: &AppState,
    token: &str,
) -> Result<Response<ResponseBody>, AppError> {
    let caller = state.engine.authenticate(token).await?;
    let active = state.engine.count_active_raffles(&caller).await?;
    json_response(
        StatusCode::OK,
        &ActiveCount {
            active,
            limit: MAX_ACTIVE_RAFFLES,
        },
    )
}

pub async fn get(
    state: &AppState,
    raffle_id: &RaffleId,
) -> Result<Response<ResponseBody>, AppError> {
    let board = state.engine.get_raffle(raffle_id).await?;
    json_response(StatusCode::OK, &board)
}

pub async fn update(
    state: &AppState,
    token: &str,
    raffle_id: &RaffleId,
    update: RaffleUpdate,
) -> Result<Response<ResponseBody>, AppError> {
    let raffle = state.engine.update_raffle(token, raffle_id, update).await?;
    json_response(StatusCode::OK, &raffle)
}

pub async fn update_slot(
    state: &AppState,
    token: &str,
    raffle_id: &RaffleId,
    slot_number: i64,
    payload: SlotPayload,
) -> Result<Response<ResponseBody>, AppError> {
    let slot = state
        .engine
        .update_slot(
            token,
            raffle_id,
            slot_number,
            payload.participant_name,
            payload.status,
        )
        .await?;
    json_response(StatusCode::OK, &slot)
}

pub async fn finalize(
    state: &AppState,
    token: &str,
    raffle_id: &RaffleId,
    payload: FinalizePayload,
) -> Result<Response<ResponseBody>, AppError> {
    let raffle = state
        .engine
        .finalize_raffle(token, raffle_id, payload.winner_slot_number)
        .await?;
    json_response(StatusCode::OK, &raffle)
}

pub async fn draw(
    state: &AppState,
    token: &str,
    raffle_id: &RaffleId,
) -> Result<Response<ResponseBody>, AppError> {
    let raffle = state.engine.draw_winner(token, raffle_id).await?;
    json_response(StatusCode::OK, &raffle)
}

pub async fn activity(
    state: &AppState,
    token: &str,
    raffle_id: &RaffleId,
) -> Result<Response<ResponseBody>, AppError> {
    let activity = state.engine.list_activity(token, raffle_id).await?;
    json_response(StatusCode::OK, &activity)
}
