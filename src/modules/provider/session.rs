use crate::modules::error::code::ErrorCode;
use crate::modules::error::NuboResult;
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;
use rustls::RootCertStore;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_io_timeout::TimeoutStream;
use tracing::error;

pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + std::fmt::Debug {}

impl SessionStream for Box<dyn SessionStream> {}

impl<T: SessionStream> SessionStream for tokio_rustls::client::TlsStream<T> {}

impl<T: SessionStream> SessionStream for BufWriter<T> {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + std::fmt::Debug> SessionStream
    for Pin<Box<TimeoutStream<T>>>
{
}

fn remote_timeout() -> Duration {
    Duration::from_secs(SETTINGS.nubo_remote_timeout_seconds)
}

pub(crate) async fn establish_tcp_connection_with_timeout(
    address: SocketAddr,
) -> NuboResult<Pin<Box<TimeoutStream<TcpStream>>>> {
    let limit = remote_timeout();
    let tcp_stream = timeout(limit, TcpStream::connect(address))
        .await
        .map_err(|_| {
            error!(
                "TCP connection to {} timed out after {}s",
                address,
                limit.as_secs()
            );
            raise_error!(
                format!(
                    "TCP connection to {} timed out after {}s",
                    address,
                    limit.as_secs()
                ),
                ErrorCode::ConnectionTimeout
            )
        })?
        .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

    // Disable Nagle's algorithm for more efficient network communication
    tcp_stream
        .set_nodelay(true)
        .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

    // Wrap the TCP stream in a TimeoutStream so a stalled server cannot
    // hang a sync pass past its lease.
    let mut timeout_stream = TimeoutStream::new(tcp_stream);
    timeout_stream.set_write_timeout(Some(limit));
    timeout_stream.set_read_timeout(Some(limit));

    Ok(Box::pin(timeout_stream))
}

pub(crate) async fn establish_tls_connection(
    address: SocketAddr,
    server_hostname: &str,
    alpn_protocols: &[&str],
) -> NuboResult<impl SessionStream> {
    let tcp_stream = establish_tcp_connection_with_timeout(address).await?;
    let tls_stream = establish_tls_stream(server_hostname, alpn_protocols, tcp_stream).await?;
    Ok(tls_stream)
}

pub(crate) async fn establish_tls_stream(
    server_hostname: &str,
    alpn_protocols: &[&str],
    stream: impl SessionStream + 'static,
) -> NuboResult<Box<dyn SessionStream>> {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    };

    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    config.alpn_protocols = alpn_protocols
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();

    let tls_connector = tokio_rustls::TlsConnector::from(Arc::new(config));

    let server_name = rustls_pki_types::ServerName::try_from(server_hostname)
        .map_err(|_| raise_error!("Invalid DNS name".into(), ErrorCode::NetworkError))?
        .to_owned();

    let tls_stream = tls_connector
        .connect(server_name, stream)
        .await
        .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

    let boxed: Box<dyn SessionStream> = Box::new(tls_stream);
    Ok(boxed)
}
