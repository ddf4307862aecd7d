use http::header::LOCATION;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use raffle_board_openidconnect::begin_authentication;

use super::empty_response;
use crate::error::AppError;
use crate::session::Session;
use crate::{AppState, ResponseBody};

/// Sends the browser to the identity provider. The PKCE verifier, nonce and
/// csrf token wait in a cookie until the provider redirects back.
pub async fn openid_login(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Response<ResponseBody>, AppError> {
    if state.config.openidconnect.is_none() {
        return Err(AppError::OpenIdNotConfigured);
    }
    let (auth_url, openid_session) = begin_authentication(&state.config).await?;

    let mut response = empty_response(StatusCode::TEMPORARY_REDIRECT);
    response
        .headers_mut()
        .insert(LOCATION, HeaderValue::try_from(auth_url)?);
    Session::new(headers)
        .with_temporary_openidconnect_state(openid_session)
        .write_cookies(response.headers_mut())?;
    Ok(response)
}
