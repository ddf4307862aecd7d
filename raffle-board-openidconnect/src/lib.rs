//! Identity through an openid connect provider.
//!
//! Users sign in with the authorization code flow and use the id token they
//! get back as bearer token. Verifying a token yields its `sub` claim as the
//! user id.

pub mod error;
pub mod http_client;

use std::str::FromStr as _;

use async_trait::async_trait;
use oauth2::basic::{BasicErrorResponseType, BasicTokenType};
use oauth2::{
    AuthorizationCode, ClientId, ClientSecret, EmptyExtraTokenFields, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RevocationErrorResponseType, StandardErrorResponse,
    StandardRevocableToken, StandardTokenIntrospectionResponse, StandardTokenResponse,
    TokenResponse as _,
};
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthPrompt, CoreAuthenticationFlow, CoreClient, CoreGenderClaim,
    CoreIdToken, CoreJsonWebKey, CoreJsonWebKeyType, CoreJsonWebKeyUse,
    CoreJweContentEncryptionAlgorithm, CoreJwsSigningAlgorithm, CoreProviderMetadata,
};
use openidconnect::{
    AccessTokenHash, EmptyAdditionalClaims, IdTokenClaims, IdTokenFields, IssuerUrl, Nonce,
    TokenResponse,
};
use raffle_board_config::Config;
use raffle_board_lifecycle::{IdentityError, IdentityProvider, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::OpenIdConnectError;
use crate::http_client::my_http_client;

pub const REDIRECT_PATH: &str = "/openidconnect-redirect";

type OpenIdConnectClientType = openidconnect::Client<
    EmptyAdditionalClaims,
    CoreAuthDisplay,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJwsSigningAlgorithm,
    CoreJsonWebKeyType,
    CoreJsonWebKeyUse,
    CoreJsonWebKey,
    CoreAuthPrompt,
    StandardErrorResponse<BasicErrorResponseType>,
    StandardTokenResponse<
        IdTokenFields<
            EmptyAdditionalClaims,
            EmptyExtraTokenFields,
            CoreGenderClaim,
            CoreJweContentEncryptionAlgorithm,
            CoreJwsSigningAlgorithm,
            CoreJsonWebKeyType,
        >,
        BasicTokenType,
    >,
    BasicTokenType,
    StandardTokenIntrospectionResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<RevocationErrorResponseType>,
>;

#[derive(Deserialize)]
pub struct OpenIdRedirect<T> {
    pub state: String,
    #[serde(flatten)]
    pub inner: T,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum OpenIdRedirectInner {
    Success(OpenIdRedirectSuccess),
    Error(OpenIdRedirectError),
}

#[derive(Deserialize, Serialize)]
pub struct OpenIdRedirectError {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

#[derive(Deserialize, Serialize)]
pub struct OpenIdRedirectSuccess {
    pub code: String,
}

/// State kept in the browser between redirecting to the provider and coming
/// back.
#[derive(Serialize, Deserialize)]
pub struct OpenIdSession {
    pub verifier: PkceCodeVerifier,
    pub nonce: Nonce,
    pub csrf_token: oauth2::CsrfToken,
}

static OPENID_CLIENT: OnceCell<OpenIdConnectClientType> = OnceCell::const_new();

pub async fn get_openid_client(
    config: &Config,
) -> Result<&'static OpenIdConnectClientType, OpenIdConnectError> {
    let openidconnect = config
        .openidconnect
        .as_ref()
        .ok_or(OpenIdConnectError::NotConfigured)?;
    OPENID_CLIENT
        .get_or_try_init(|| async {
            let provider_metadata = CoreProviderMetadata::discover_async(
                IssuerUrl::new(openidconnect.issuer_url.clone())?,
                my_http_client,
            )
            .await?;

            let client = CoreClient::from_provider_metadata(
                provider_metadata,
                ClientId::new(openidconnect.client_id.clone()),
                Some(ClientSecret::new(openidconnect.client_secret.clone())),
            )
            .set_redirect_uri(RedirectUrl::new(format!(
                "{}{REDIRECT_PATH}",
                config.url.trim_end_matches('/')
            ))?);
            Ok(client)
        })
        .await
}

pub async fn begin_authentication(
    config: &Config,
) -> Result<(String, OpenIdSession), OpenIdConnectError> {
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_token, nonce) = get_openid_client(config)
        .await?
        .authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            openidconnect::CsrfToken::new_random,
            Nonce::new_random,
        )
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok((
        auth_url.to_string(),
        OpenIdSession {
            verifier: pkce_verifier,
            nonce,
            csrf_token,
        },
    ))
}

/// Exchanges the authorization code and returns the verified id token in its
/// compact serialization.
pub async fn finish_authentication(
    config: &Config,
    session: OpenIdSession,
    input: OpenIdRedirect<OpenIdRedirectSuccess>,
) -> Result<String, OpenIdConnectError> {
    if &input.state != session.csrf_token.secret() {
        return Err(OpenIdConnectError::WrongCsrfToken);
    };

    let client = get_openid_client(config).await?;

    let token_response = client
        .exchange_code(AuthorizationCode::new(input.inner.code))
        .set_pkce_verifier(session.verifier)
        .request_async(my_http_client)
        .await?;

    let id_token = token_response
        .id_token()
        .ok_or(OpenIdConnectError::NoIdTokenReturned)?;
    let claims = id_token.claims(&client.id_token_verifier(), &session.nonce)?;

    // the access token must belong to the same login as the id token
    if let Some(expected_access_token_hash) = claims.access_token_hash() {
        let actual_access_token_hash =
            AccessTokenHash::from_token(token_response.access_token(), &id_token.signing_alg()?)?;
        if actual_access_token_hash != *expected_access_token_hash {
            return Err(OpenIdConnectError::InvalidAccessToken);
        }
    }

    debug!("{} signed in", claims.subject().as_str());
    Ok(id_token.to_string())
}

pub async fn id_token_claims(
    config: &Config,
    id_token: &str,
) -> Result<IdTokenClaims<EmptyAdditionalClaims, CoreGenderClaim>, OpenIdConnectError> {
    let client = get_openid_client(config).await?;

    let id_token = CoreIdToken::from_str(id_token)
        .map_err(|err| OpenIdConnectError::MalformedIdToken(err.to_string()))?;
    let claims = id_token.claims(&client.id_token_verifier(), |_v: Option<&Nonce>| Ok(()))?;
    Ok(claims.clone())
}

/// Accepts id tokens issued by the configured provider.
pub struct OpenIdConnectProvider {
    config: Config,
}

impl OpenIdConnectProvider {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IdentityProvider for OpenIdConnectProvider {
    async fn verify_token(&self, token: &str) -> Result<UserId, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }
        match id_token_claims(&self.config, token).await {
            Ok(claims) => Ok(UserId::from(claims.subject().as_str())),
            Err(
                err @ (OpenIdConnectError::NotConfigured
                | OpenIdConnectError::Discovery(_)
                | OpenIdConnectError::Oauth2Parse(_)),
            ) => Err(IdentityError::Unavailable(Box::new(err))),
            Err(err) => Err(IdentityError::InvalidToken(err.to_string())),
        }
    }
}
