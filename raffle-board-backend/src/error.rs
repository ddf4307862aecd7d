use bytes::Bytes;
use headers::{ContentType, HeaderMapExt as _};
use http::{Method, Response, StatusCode};
use http_body_util::{BodyExt as _, Full};
use raffle_board_config::ConfigError;
use raffle_board_database::error::DatabaseError;
use raffle_board_lifecycle::{ErrorKind, RaffleError};
use raffle_board_openidconnect::error::OpenIdConnectError;
use serde::Serialize;
use tracing::{debug, error};

use crate::ResponseBody;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Raffle(#[from] RaffleError),
    #[error("request body could not be read: {0}")]
    Body(String),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed query: {0}")]
    Query(#[from] serde_urlencoded::de::Error),
    #[error("no route for {0}")]
    NotFound(String),
    #[error("method {0} is not allowed here")]
    MethodNotAllowed(Method),
    #[error("response could not be encoded: {0}")]
    ResponseEncoding(#[source] serde_json::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    #[error("openid connect error: {0}")]
    OpenIdConnect(#[from] OpenIdConnectError),
    #[error("the identity provider reported {error}: {error_description}")]
    OpenIdRedirect {
        error: String,
        error_description: String,
    },
    #[error("your sign in attempt expired, please try again")]
    OpenIdTokenNotFound,
    #[error("the server administrator has not configured openid connect")]
    OpenIdNotConfigured,
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("utc offset of {0} minutes is out of range")]
    UtcOffset(i32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine readable error category sent to clients.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum ResponseKind {
    Raffle(ErrorKind),
    Other(&'static str),
}

#[derive(Serialize)]
struct ErrorResponse {
    kind: ResponseKind,
    message: String,
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Raffle(err) => match err.kind() {
                ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
                ErrorKind::QuotaExceeded
                | ErrorKind::AlreadyFinalized
                | ErrorKind::NoScheduledDate
                | ErrorKind::TooEarly => StatusCode::CONFLICT,
                ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Body(_) | Self::Json(_) | Self::Query(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::OpenIdNotConfigured => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::OpenIdConnect(_) | Self::OpenIdRedirect { .. } | Self::OpenIdTokenNotFound => {
                StatusCode::UNAUTHORIZED
            }
            Self::ResponseEncoding(_)
            | Self::InvalidHeader(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::UtcOffset(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        match self {
            Self::Raffle(err) => ResponseKind::Raffle(err.kind()),
            Self::Body(_) | Self::Json(_) | Self::Query(_) => {
                ResponseKind::Raffle(ErrorKind::ValidationError)
            }
            Self::NotFound(_) | Self::OpenIdNotConfigured => {
                ResponseKind::Raffle(ErrorKind::NotFound)
            }
            Self::MethodNotAllowed(_) => ResponseKind::Other("MethodNotAllowed"),
            Self::OpenIdConnect(_) | Self::OpenIdRedirect { .. } | Self::OpenIdTokenNotFound => {
                ResponseKind::Raffle(ErrorKind::Unauthenticated)
            }
            Self::ResponseEncoding(_)
            | Self::InvalidHeader(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::UtcOffset(_)
            | Self::Io(_) => ResponseKind::Other("InternalError"),
        }
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("request failed: {self}");
            "internal server error".to_owned()
        } else {
            debug!("request rejected: {self}");
            self.to_string()
        };
        let body = ErrorResponse {
            kind: self.kind(),
            message,
        };
        // serializing two plain fields can not fail
        let body = serde_json::to_vec(&body).unwrap_or_default();

        let mut response = Response::new(Full::new(Bytes::from(body)).boxed_unsync());
        *response.status_mut() = status;
        response.headers_mut().typed_insert(ContentType::json());
        response
    }
}
