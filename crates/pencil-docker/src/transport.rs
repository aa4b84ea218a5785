//! Engine connections. `http(s)://` and `tcp://` endpoints go through
//! reqwest; `unix://` (and `npipe://` on Windows) speak HTTP/1.1 through
//! hyper over the local socket, one connection per request.

use std::fmt;
use std::future::Future;
#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{header, Request};
use hyper_util::rt::TokioIo;
use pencil_reconcile::AdapterError;
use reqwest::Url;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Authority sent in the `Host` header over a local socket.
const SOCKET_ORIGIN: &str = "http://docker/";

/// Status and body of one engine reply.
#[derive(Debug)]
pub(crate) struct Reply {
    pub status: u16,
    pub body: Bytes,
}

impl Reply {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Body of a 2xx reply; any other status becomes an `Api` error carrying
    /// the engine's message.
    pub fn into_success(self) -> Result<Bytes, AdapterError> {
        if (200..300).contains(&self.status) {
            return Ok(self.body);
        }
        Err(AdapterError::Api {
            status: self.status,
            message: String::from_utf8_lossy(&self.body).trim().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
enum Conn {
    Http(reqwest::Client),
    #[cfg(unix)]
    Unix { socket: PathBuf, timeout: Duration },
    #[cfg(windows)]
    Pipe { pipe: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub(crate) struct Transport {
    base: Url,
    conn: Conn,
}

impl Transport {
    pub fn from_endpoint(endpoint: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let endpoint = endpoint.trim();
        if let Some(path) = endpoint.strip_prefix("unix://") {
            return Self::unix(path, timeout);
        }
        if let Some(path) = endpoint.strip_prefix("npipe://") {
            return Self::pipe(path, timeout);
        }

        let endpoint = match endpoint.strip_prefix("tcp://") {
            Some(rest) => format!("http://{rest}"),
            None => endpoint.to_string(),
        };
        let base = Url::parse(&endpoint)
            .map_err(|e| AdapterError::Config(format!("docker endpoint {endpoint}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(AdapterError::Config(format!(
                "docker endpoint {endpoint} cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config(format!("docker http client: {e}")))?;
        Ok(Self {
            base,
            conn: Conn::Http(http),
        })
    }

    #[cfg(unix)]
    fn unix(path: &str, timeout: Duration) -> Result<Self, AdapterError> {
        if path.is_empty() {
            return Err(AdapterError::Config(
                "docker endpoint unix:// names no socket path".to_string(),
            ));
        }
        Ok(Self {
            base: socket_origin()?,
            conn: Conn::Unix {
                socket: PathBuf::from(path),
                timeout,
            },
        })
    }

    #[cfg(not(unix))]
    fn unix(path: &str, _timeout: Duration) -> Result<Self, AdapterError> {
        Err(AdapterError::Config(format!(
            "docker endpoint unix://{path} is not available on this platform"
        )))
    }

    /// `npipe:////./pipe/docker_engine` names `\\.\pipe\docker_engine`.
    #[cfg(windows)]
    fn pipe(path: &str, timeout: Duration) -> Result<Self, AdapterError> {
        if path.is_empty() {
            return Err(AdapterError::Config(
                "docker endpoint npipe:// names no pipe".to_string(),
            ));
        }
        Ok(Self {
            base: socket_origin()?,
            conn: Conn::Pipe {
                pipe: path.replace('/', "\\"),
                timeout,
            },
        })
    }

    #[cfg(not(windows))]
    fn pipe(path: &str, _timeout: Duration) -> Result<Self, AdapterError> {
        Err(AdapterError::Config(format!(
            "docker endpoint npipe://{path} is only available on Windows"
        )))
    }

    pub fn is_local_socket(&self) -> bool {
        !matches!(self.conn, Conn::Http(_))
    }

    /// `segments` appended to the base path, each percent-encoded on its own.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get(&self, segments: &[&str]) -> Result<Reply, AdapterError> {
        let url = self.url(segments);
        match &self.conn {
            Conn::Http(http) => {
                let resp = http.get(url).send().await.map_err(transport)?;
                let status = resp.status().as_u16();
                let body = resp.bytes().await.map_err(transport)?;
                Ok(Reply { status, body })
            }
            #[cfg(unix)]
            Conn::Unix { socket, timeout } => {
                let exchange = async {
                    let stream = tokio::net::UnixStream::connect(socket)
                        .await
                        .map_err(|e| transport(format!("{}: {e}", socket.display())))?;
                    http1_get(stream, &url).await
                };
                within(*timeout, exchange).await
            }
            #[cfg(windows)]
            Conn::Pipe { pipe, timeout } => {
                let exchange = async {
                    let stream = tokio::net::windows::named_pipe::ClientOptions::new()
                        .open(pipe)
                        .map_err(|e| transport(format!("{pipe}: {e}")))?;
                    http1_get(stream, &url).await
                };
                within(*timeout, exchange).await
            }
        }
    }
}

#[cfg(any(unix, windows))]
fn socket_origin() -> Result<Url, AdapterError> {
    Url::parse(SOCKET_ORIGIN).map_err(|e| AdapterError::Config(format!("socket origin: {e}")))
}

#[cfg(any(unix, windows))]
async fn within<F>(timeout: Duration, exchange: F) -> Result<Reply, AdapterError>
where
    F: Future<Output = Result<Reply, AdapterError>>,
{
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| transport(format!("engine did not answer within {timeout:?}")))?
}

async fn http1_get<S>(stream: S, url: &Url) -> Result<Reply, AdapterError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(transport)?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "engine connection closed with error");
        }
    });

    let target = match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    };
    let req = Request::get(target)
        .header(header::HOST, url.host_str().unwrap_or("docker"))
        .body(Empty::<Bytes>::new())
        .map_err(transport)?;

    let resp = sender.send_request(req).await.map_err(transport)?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(transport)?
        .to_bytes();
    Ok(Reply { status, body })
}

fn transport(e: impl fmt::Display) -> AdapterError {
    AdapterError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn tcp_endpoint_becomes_http() {
        let t = Transport::from_endpoint("tcp://10.0.0.5:2376", T).unwrap();
        assert!(!t.is_local_socket());
        assert_eq!(
            t.url(&["containers", "json"]).as_str(),
            "http://10.0.0.5:2376/containers/json"
        );
    }

    #[test]
    fn container_ids_stay_in_one_segment() {
        let t = Transport::from_endpoint("http://h:1/", T).unwrap();
        assert_eq!(
            t.url(&["containers", "a/b?c", "json"]).path(),
            "/containers/a%2Fb%3Fc/json"
        );
    }

    #[cfg(unix)]
    #[test]
    fn unix_endpoint_uses_socket() {
        let t = Transport::from_endpoint("unix:///var/run/docker.sock", T).unwrap();
        assert!(t.is_local_socket());
        assert_eq!(t.url(&["containers", "json"]).path(), "/containers/json");
        assert!(matches!(
            Transport::from_endpoint("unix://", T),
            Err(AdapterError::Config(_))
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn named_pipe_needs_windows() {
        let err = Transport::from_endpoint("npipe:////./pipe/docker_engine", T).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)), "got {err:?}");
    }

    #[test]
    fn non_success_reply_is_an_api_error() {
        let reply = Reply {
            status: 500,
            body: Bytes::from_static(b" {\"message\":\"boom\"}\n"),
        };
        assert_eq!(
            reply.into_success().unwrap_err(),
            AdapterError::Api {
                status: 500,
                message: "{\"message\":\"boom\"}".to_string(),
            }
        );
    }
}
