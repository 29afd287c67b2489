use super::codec::{decode_response, encode_request, DecodeError};
use super::model::{Query, ReadingSet};
use crate::config::{EndpointConfig, FramingConfig, FramingMode, LEGACY_BUFFER_SIZE};
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connect,
    Transport,
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Write,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Write => f.write_str("writing to"),
            Stage::Read => f.write_str("reading from"),
        }
    }
}

/// Outcome of an exchange that produced no readings.
#[derive(Debug, Error)]
pub enum ExchangeFailure {
    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("transport error while {stage} {endpoint}: {source}")]
    Transport {
        endpoint: String,
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: DecodeError,
    },
}

impl ExchangeFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExchangeFailure::Connect { .. } => FailureKind::Connect,
            ExchangeFailure::Transport { .. } => FailureKind::Transport,
            ExchangeFailure::Decode { .. } => FailureKind::Decode,
        }
    }

    pub fn detail(&self) -> Option<String> {
        let detail = match self {
            ExchangeFailure::Connect { source, .. } => source.to_string(),
            ExchangeFailure::Transport { source, .. } => source.to_string(),
            ExchangeFailure::Decode { source, .. } => source.to_string(),
        };
        (!detail.is_empty()).then_some(detail)
    }
}

/// Performs one request/response exchange per [`TelemetryClient::fetch`] call,
/// over a fresh connection each time.
#[derive(Debug, Clone)]
pub struct TelemetryClient {
    endpoint: EndpointConfig,
    framing: FramingConfig,
}

impl TelemetryClient {
    pub fn new(endpoint: EndpointConfig, framing: FramingConfig) -> Self {
        Self { endpoint, framing }
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub async fn fetch(&self, query: &Query) -> Result<ReadingSet, ExchangeFailure> {
        let endpoint = self.endpoint.address();

        let mut stream = with_timeout(
            self.endpoint.connect_timeout(),
            TcpStream::connect(endpoint.as_str()),
        )
        .await
        .map_err(|source| ExchangeFailure::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;

        let request = encode_request(query);
        debug!(
            endpoint = %endpoint,
            request = %String::from_utf8_lossy(&request),
            "sending telemetry request"
        );

        with_timeout(self.endpoint.io_timeout(), stream.write_all(&request))
            .await
            .map_err(|source| ExchangeFailure::Transport {
                endpoint: endpoint.clone(),
                stage: Stage::Write,
                source,
            })?;

        let raw = with_timeout(
            self.endpoint.response_timeout(),
            self.read_response(&mut stream),
        )
        .await
        .map_err(|source| ExchangeFailure::Transport {
            endpoint: endpoint.clone(),
            stage: Stage::Read,
            source,
        })?;
        drop(stream);

        debug!(endpoint = %endpoint, bytes = raw.len(), "received telemetry response");

        decode_response(&raw).map_err(|source| ExchangeFailure::Decode { endpoint, source })
    }

    async fn read_response(&self, stream: &mut TcpStream) -> io::Result<Vec<u8>> {
        match self.framing.mode {
            FramingMode::SingleRead => {
                let mut buf = vec![0u8; LEGACY_BUFFER_SIZE];
                let n = with_timeout(self.endpoint.io_timeout(), stream.read(&mut buf)).await?;
                buf.truncate(n);
                Ok(buf)
            }
            FramingMode::UntilClose => self.read_until_close(stream).await,
        }
    }

    /// Assemble a response from as many reads as it takes. Ends on EOF, or on an idle gap once
    /// the first bytes have arrived.
    async fn read_until_close(&self, stream: &mut TcpStream) -> io::Result<Vec<u8>> {
        let limit = self.framing.max_response_bytes;
        let mut response = Vec::new();
        let mut chunk = [0u8; LEGACY_BUFFER_SIZE];

        loop {
            let n = if response.is_empty() {
                with_timeout(self.endpoint.io_timeout(), stream.read(&mut chunk)).await?
            } else {
                match timeout(self.framing.idle_timeout(), stream.read(&mut chunk)).await {
                    Ok(read) => read?,
                    Err(_) => {
                        debug!(bytes = response.len(), "peer idle; treating response as complete");
                        break;
                    }
                }
            };

            if n == 0 {
                break;
            }
            if response.len() + n > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("response exceeds {limit} bytes"),
                ));
            }
            response.extend_from_slice(&chunk[..n]);
        }

        Ok(response)
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}
