use http::{HeaderMap, Response, StatusCode};
use raffle_board_openidconnect::{
    finish_authentication, OpenIdRedirect, OpenIdRedirectError, OpenIdRedirectInner,
};
use serde::Serialize;

use super::json_response;
use crate::error::AppError;
use crate::session::Session;
use crate::{AppState, ResponseBody};

#[derive(Serialize)]
struct SignedIn {
    id_token: String,
}

/// Finishes the login started by [`super::openid_login::openid_login`] and
/// hands the verified id token to the client, which uses it as bearer token
/// from then on.
pub async fn openid_redirect(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response<ResponseBody>, AppError> {
    if state.config.openidconnect.is_none() {
        return Err(AppError::OpenIdNotConfigured);
    }
    let input: OpenIdRedirect<OpenIdRedirectInner> =
        serde_urlencoded::from_str(query.unwrap_or_default())?;

    let mut session = Session::new(headers);
    let openid_session = session.take_temporary_openidconnect_state()?;

    let id_token = match input.inner {
        OpenIdRedirectInner::Error(OpenIdRedirectError {
            error,
            error_description,
        }) => {
            return Err(AppError::OpenIdRedirect {
                error,
                error_description,
            })
        }
        OpenIdRedirectInner::Success(success) => {
            finish_authentication(
                &state.config,
                openid_session,
                OpenIdRedirect {
                    state: input.state,
                    inner: success,
                },
            )
            .await?
        }
    };

    let mut response = json_response(StatusCode::OK, &SignedIn { id_token })?;
    session.write_cookies(response.headers_mut())?;
    Ok(response)
}
