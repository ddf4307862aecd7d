//! Cookie state for the openid connect login.
//!
//! The API itself is authenticated with bearer tokens. The only cookie the
//! server sets is the PKCE verifier, nonce and csrf token between the login
//! redirect and the provider calling back.

use cookie::{Cookie, SameSite};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use raffle_board_openidconnect::OpenIdSession;
use tracing::debug;

use crate::error::AppError;

const COOKIE_NAME_TEMPORARY_OPENIDCONNECT_STATE: &str = "__Host-temporary_openidconnect_state";

#[must_use]
pub struct Session {
    // bool is true when the value was changed
    temporary_openidconnect_state: (Option<OpenIdSession>, bool),
}

impl Session {
    pub fn new(headers: &HeaderMap) -> Self {
        let mut temporary_openidconnect_state = None;
        headers
            .get_all(COOKIE)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
            .map(std::borrow::ToOwned::to_owned)
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(std::result::Result::ok)
            .for_each(|cookie| {
                if cookie.name() == COOKIE_NAME_TEMPORARY_OPENIDCONNECT_STATE {
                    match serde_json::from_str(cookie.value()) {
                        Ok(state) => temporary_openidconnect_state = Some(state),
                        Err(err) => debug!("failed to parse openid connect state: {err}"),
                    }
                }
            });
        Self {
            temporary_openidconnect_state: (temporary_openidconnect_state, false),
        }
    }

    pub fn with_temporary_openidconnect_state(self, input: OpenIdSession) -> Self {
        Self {
            temporary_openidconnect_state: (Some(input), true),
        }
    }

    pub fn take_temporary_openidconnect_state(&mut self) -> Result<OpenIdSession, AppError> {
        let state = self
            .temporary_openidconnect_state
            .0
            .take()
            .ok_or(AppError::OpenIdTokenNotFound)?;
        self.temporary_openidconnect_state.1 = true;
        Ok(state)
    }

    /// Writes `Set-Cookie` headers for everything that changed.
    pub fn write_cookies(self, headers: &mut HeaderMap) -> Result<(), AppError> {
        if let (value, true) = self.temporary_openidconnect_state {
            let mut cookie = Cookie::build((
                COOKIE_NAME_TEMPORARY_OPENIDCONNECT_STATE,
                value
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(AppError::ResponseEncoding)?
                    .unwrap_or_default(),
            ))
            .path("/")
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
            if value.is_none() {
                cookie.make_removal();
            }
            headers.append(
                SET_COOKIE,
                HeaderValue::try_from(cookie.encoded().to_string())?,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> OpenIdSession {
        serde_json::from_value(serde_json::json!({
            "verifier": "verifier; with, separators",
            "nonce": "nonce",
            "csrf_token": "csrf",
        }))
        .unwrap()
    }

    #[test]
    fn state_survives_the_cookie_round_trip() {
        let mut response_headers = HeaderMap::new();
        Session::new(&HeaderMap::new())
            .with_temporary_openidconnect_state(state())
            .write_cookies(&mut response_headers)
            .unwrap();

        let set_cookie = response_headers[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("__Host-temporary_openidconnect_state="));
        assert!(set_cookie.contains("HttpOnly"));
        let pair = set_cookie.split(';').next().unwrap();

        let mut request_headers = HeaderMap::new();
        request_headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        let mut session = Session::new(&request_headers);
        let restored = session.take_temporary_openidconnect_state().unwrap();
        assert_eq!(restored.csrf_token.secret(), "csrf");
        assert_eq!(restored.verifier.secret(), "verifier; with, separators");

        let mut response_headers = HeaderMap::new();
        session.write_cookies(&mut response_headers).unwrap();
        assert!(response_headers[SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
    }

    #[test]
    fn missing_state_is_reported() {
        let mut session = Session::new(&HeaderMap::new());
        assert!(matches!(
            session.take_temporary_openidconnect_state(),
            Err(AppError::OpenIdTokenNotFound)
        ));
        let mut headers = HeaderMap::new();
        Session::new(&HeaderMap::new())
            .write_cookies(&mut headers)
            .unwrap();
        assert!(headers.is_empty());
    }
}
