//! Minimal HTTP/1.1 client on top of hyper.
//!
//! Used for openid connect discovery and token exchange as well as for calls
//! to the content generation service. `https` urls are verified against the
//! webpki roots.

use std::str::FromStr as _;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::header::HOST;
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use oauth2::{HttpRequest, HttpResponse};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{InvalidDnsNameError, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::error::HttpError;

fn tls_connector() -> TlsConnector {
    let mut root_cert_store = RootCertStore::empty();
    root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn exchange<T>(io: T, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, HttpError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;
    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            warn!("http client connection failed: {err}");
        }
    });

    let response = sender.send_request(request).await?;
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Response::from_parts(parts, body))
}

/// Sends `request` to the host named in its absolute uri and collects the
/// whole response body.
pub async fn send(mut request: Request<Full<Bytes>>) -> Result<Response<Bytes>, HttpError> {
    let uri = request.uri().clone();
    let host = uri
        .host()
        .ok_or_else(|| HttpError::MissingHost(uri.to_string()))?
        .to_owned();
    let tls = match uri.scheme_str() {
        Some("https") => true,
        Some("http") => false,
        other => {
            return Err(HttpError::UnsupportedScheme(
                other.unwrap_or_default().to_owned(),
            ))
        }
    };
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    if let Some(authority) = uri.authority() {
        if !request.headers().contains_key(HOST) {
            request
                .headers_mut()
                .insert(HOST, authority.as_str().parse().map_err(hyper::http::Error::from)?);
        }
    }
    let origin_form = uri
        .path_and_query()
        .map_or("/", hyper::http::uri::PathAndQuery::as_str);
    *request.uri_mut() = Uri::from_str(origin_form).map_err(hyper::http::Error::from)?;

    debug!("{} {uri}", request.method());
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    if tls {
        let server_name = ServerName::try_from(host)?;
        let stream = tls_connector().connect(server_name, stream).await?;
        exchange(stream, request).await
    } else {
        exchange(stream, request).await
    }
}

/// Adapter for the `http` 0.2 types used by `oauth2` and `openidconnect`.
pub async fn my_http_client(request: HttpRequest) -> Result<HttpResponse, HttpError> {
    let mut builder = Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    let response = send(builder.body(Full::new(Bytes::from(request.body)))?).await?;

    let status_code = oauth2::http::StatusCode::from_u16(response.status().as_u16())
        .map_err(|err| HttpError::InvalidMessage(err.to_string()))?;
    let mut headers = oauth2::http::HeaderMap::new();
    for (name, value) in response.headers() {
        headers.append(
            oauth2::http::HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|err| HttpError::InvalidMessage(err.to_string()))?,
            oauth2::http::HeaderValue::from_bytes(value.as_bytes())
                .map_err(|err| HttpError::InvalidMessage(err.to_string()))?,
        );
    }
    Ok(HttpResponse {
        status_code,
        headers,
        body: response.into_body().to_vec(),
    })
}

impl From<InvalidDnsNameError> for HttpError {
    fn from(value: InvalidDnsNameError) -> Self {
        Self::InvalidMessage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use hyper::Method;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;

    /// Answers exactly one request with `response` and hands back what it
    /// received.
    async fn one_shot_server(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0; 1024];
            loop {
                let read = stream.read(&mut buffer).await.unwrap();
                received.extend_from_slice(&buffer[..read]);
                if read == 0 || received.windows(4).any(|window| window == b"\r\n\r\n") {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(received).unwrap()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn plain_http_round_trip() {
        let (base, server) = one_shot_server(
            "HTTP/1.1 201 Created\r\ncontent-type: application/json\r\ncontent-length: 11\r\n\r\n{\"ok\":true}",
        )
        .await;

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{base}/raffle-text?lang=en"))
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();
        let response = send(request).await.unwrap();

        assert_eq!(response.status(), 201);
        assert_eq!(response.body().as_ref(), b"{\"ok\":true}");
        let received = server.await.unwrap();
        assert!(received.starts_with("POST /raffle-text?lang=en HTTP/1.1\r\n"));
        assert!(received.to_lowercase().contains("host: 127.0.0.1:"));
    }

    #[tokio::test]
    async fn oauth_requests_are_translated() {
        let (base, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nx-issuer: test\r\ncontent-length: 2\r\n\r\n{}",
        )
        .await;

        let response = my_http_client(HttpRequest {
            url: oauth2::url::Url::parse(&format!("{base}/.well-known/openid-configuration"))
                .unwrap(),
            method: oauth2::http::Method::GET,
            headers: oauth2::http::HeaderMap::new(),
            body: Vec::new(),
        })
        .await
        .unwrap();

        assert_eq!(response.status_code, oauth2::http::StatusCode::OK);
        assert_eq!(response.headers["x-issuer"], "test");
        assert_eq!(response.body, b"{}");
        assert!(server
            .await
            .unwrap()
            .starts_with("GET /.well-known/openid-configuration HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn rejects_urls_it_can_not_reach() {
        let request = Request::builder()
            .uri("ftp://files.example/prize.png")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert!(matches!(
            send(request).await,
            Err(HttpError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));

        let request = Request::builder()
            .uri("/relative")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert!(matches!(send(request).await, Err(HttpError::MissingHost(_))));
    }
}
