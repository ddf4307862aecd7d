use http::{Response, StatusCode};
use raffle_board_lifecycle::content::{generate_images_or_placeholders, generate_text_or_fallback};
use serde::{Deserialize, Serialize};

use super::json_response;
use crate::error::AppError;
use crate::{AppState, ResponseBody};

#[derive(Deserialize)]
pub struct TextPayload {
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct ImagesPayload {
    pub description: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
struct Images {
    image_urls: Vec<String>,
}

/// Drafts name, description and terms for a raffle. Always answers with
/// usable text, falling back to the prompt itself.
pub async fn text(
    state: &AppState,
    token: &str,
    payload: TextPayload,
) -> Result<Response<ResponseBody>, AppError> {
    state.engine.authenticate(token).await?;
    let text = generate_text_or_fallback(state.content.as_ref(), &payload.prompt).await;
    json_response(StatusCode::OK, &text)
}

pub async fn images(
    state: &AppState,
    token: &str,
    payload: ImagesPayload,
) -> Result<Response<ResponseBody>, AppError> {
    state.engine.authenticate(token).await?;
    let image_urls = generate_images_or_placeholders(
        state.content.as_ref(),
        &payload.description,
        payload.name.as_deref(),
    )
    .await;
    json_response(StatusCode::OK, &Images { image_urls })
}
