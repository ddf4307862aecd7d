pub mod events;
pub mod generate;
pub mod openid_login;
pub mod openid_redirect;
pub mod raffles;

use bytes::Bytes;
use headers::authorization::Bearer;
use headers::{Authorization, ContentType, HeaderMapExt as _};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt as _, Full, Limited};
use raffle_board_lifecycle::{RaffleError, RaffleId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span, Instrument as _};

use crate::error::AppError;
use crate::{AppState, ResponseBody};

/// Largest request body accepted.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Answers one request. Never fails: errors become JSON error responses.
pub async fn handle<B>(state: AppState, request: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let span = info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    );
    async move {
        let response = route(&state, request)
            .await
            .unwrap_or_else(AppError::into_response);
        debug!(status = %response.status(), "responding");
        response
    }
    .instrument(span)
    .await
}

async fn route<B>(state: &AppState, request: Request<B>) -> Result<Response<ResponseBody>, AppError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let token = bearer_token(&parts.headers);
    let path = parts.uri.path();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        ["raffles"] => match method {
            Method::GET => raffles::list(state, &token).await,
            Method::POST => raffles::create(state, &token, read_json(body).await?).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["raffles", "active-count"] => match method {
            Method::GET => raffles::active_count(state, &token).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["raffles", raffle_id] => {
            let raffle_id = RaffleId::from(*raffle_id);
            match method {
                Method::GET => raffles::get(state, &raffle_id).await,
                Method::PATCH => {
                    raffles::update(state, &token, &raffle_id, read_json(body).await?).await
                }
                _ => Err(AppError::MethodNotAllowed(method)),
            }
        }
        ["raffles", raffle_id, "slots", slot_number] => match method {
            Method::PUT => {
                let slot_number = parse_slot_number(slot_number)?;
                raffles::update_slot(
                    state,
                    &token,
                    &RaffleId::from(*raffle_id),
                    slot_number,
                    read_json(body).await?,
                )
                .await
            }
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["raffles", raffle_id, "finalize"] => match method {
            Method::POST => {
                raffles::finalize(
                    state,
                    &token,
                    &RaffleId::from(*raffle_id),
                    read_json(body).await?,
                )
                .await
            }
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["raffles", raffle_id, "draw"] => match method {
            Method::POST => raffles::draw(state, &token, &RaffleId::from(*raffle_id)).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["raffles", raffle_id, "activity"] => match method {
            Method::GET => raffles::activity(state, &token, &RaffleId::from(*raffle_id)).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["raffles", raffle_id, "events"] => match method {
            Method::GET => events::stream(state, RaffleId::from(*raffle_id)).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["generate", "text"] => match method {
            Method::POST => generate::text(state, &token, read_json(body).await?).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["generate", "images"] => match method {
            Method::POST => generate::images(state, &token, read_json(body).await?).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["openidconnect-login"] => match method {
            Method::GET => openid_login::openid_login(state, &parts.headers).await,
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        ["openidconnect-redirect"] => match method {
            Method::GET => {
                openid_redirect::openid_redirect(state, &parts.headers, parts.uri.query()).await
            }
            _ => Err(AppError::MethodNotAllowed(method)),
        },
        _ => Err(AppError::NotFound(path.to_owned())),
    }
}

/// The bearer token of the request, empty when there is none.
fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|authorization| authorization.token().to_owned())
        .unwrap_or_default()
}

fn parse_slot_number(segment: &str) -> Result<i64, RaffleError> {
    segment
        .parse()
        .map_err(|_| RaffleError::validation(format!("slot number {segment:?} is not a number")))
}

async fn read_json<T, B>(body: B) -> Result<T, AppError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, MAX_BODY_SIZE)
        .collect()
        .await
        .map_err(|err| AppError::Body(err.to_string()))?
        .to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<ResponseBody>, AppError> {
    let body = serde_json::to_vec(value).map_err(AppError::ResponseEncoding)?;
    let mut response = Response::new(Full::new(Bytes::from(body)).boxed_unsync());
    *response.status_mut() = status;
    response.headers_mut().typed_insert(ContentType::json());
    Ok(response)
}

#[must_use]
pub fn empty_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::new()).boxed_unsync());
    *response.status_mut() = status;
    response
}
