//! Transport option model and the handle seam the resolver applies it to.
//!
//! The resolver never talks to a concrete HTTP client. It produces
//! [`TransportSetting`] values, in a fixed order, and applies them through
//! the [`TransportHandle`] trait one at a time. The concrete ureq-backed
//! handle lives in [`http`]; tests substitute tracking doubles.

pub mod http;
pub mod resolver;

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use url::Url;

pub use resolver::{resolve, TransportConfig, TransportTuning};

/// Initial capacity hint for a session receive buffer. A hint, not a cap.
pub const DEFAULT_PACKET_SIZE: usize = 0x20000;

/// Named transport options, listed in their fixed link-pass resolution
/// order. Order only matters where options couple: peer verification is
/// resolved before host verification so that an explicit peer-off can
/// force host-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TransportOption {
    Encoding,
    Netrc,
    Verbose,
    Timeout,
    UserAgent,
    CookieJar,
    Credentials,
    Proxy,
    VerifyPeer,
    VerifyHost,
    ClientCert,
    ClientKey,
    CaInfo,
    CaPath,
    ProtocolRestriction,
    FollowRedirects,
    MaxRedirects,
    ErrorCapture,
    BufferSize,
    KeepAlive,
}

impl TransportOption {
    /// The complete link-level pass, in application order.
    pub const LINK_PASS: &'static [TransportOption] = &[
        TransportOption::Encoding,
        TransportOption::Netrc,
        TransportOption::Verbose,
        TransportOption::Timeout,
        TransportOption::UserAgent,
        TransportOption::CookieJar,
        TransportOption::Credentials,
        TransportOption::Proxy,
        TransportOption::VerifyPeer,
        TransportOption::VerifyHost,
        TransportOption::ClientCert,
        TransportOption::ClientKey,
        TransportOption::CaInfo,
        TransportOption::CaPath,
        TransportOption::ProtocolRestriction,
        TransportOption::FollowRedirects,
        TransportOption::MaxRedirects,
        TransportOption::ErrorCapture,
        TransportOption::BufferSize,
        TransportOption::KeepAlive,
    ];

    /// The per-fetch pass. Currently empty; kept so per-fetch overrides
    /// have a place to land without reshaping the pipeline.
    pub const FETCH_PASS: &'static [TransportOption] = &[];
}

/// A concrete, resolved value ready to be applied to a handle.
///
/// Applying the same setting twice with the same value must be a no-op on
/// any conforming handle.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportSetting {
    /// `true`: accept every server-offered encoding; `false`: disable
    /// encoding negotiation entirely.
    AcceptEncodings(bool),
    /// Optional-mode netrc lookup; `file` of `None` means the default
    /// discovery location.
    Netrc { file: Option<PathBuf> },
    Verbose(bool),
    Timeout(Duration),
    ConnectTimeout(Duration),
    UserAgent(String),
    /// One file acting as both cookie jar and cookie source.
    CookieJar(PathBuf),
    /// Always applied as a pair, with "any supported" auth method.
    Credentials { user: String, password: String },
    Proxy {
        host: String,
        port: u16,
        credentials: Option<(String, String)>,
    },
    VerifyPeer(bool),
    VerifyHost(bool),
    ClientCert(PathBuf),
    ClientKey {
        path: PathBuf,
        password: Option<String>,
    },
    CaInfo(PathBuf),
    CaPath(PathBuf),
    FollowRedirects(bool),
    MaxRedirects(u32),
    /// Retain transport-level error detail for later diagnostics.
    ErrorCapture(bool),
    ReadBufferSize(u64),
    KeepAlive {
        idle: Option<u64>,
        interval: Option<u64>,
    },
}

/// Optional capabilities a handle may or may not implement.
///
/// Options gated on a capability are silently skipped (optional ones) or
/// downgraded to a warning (configured TLS client material) when the
/// handle lacks it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    ReadBufferSize,
    KeepAlive,
    ClientTls,
    Netrc,
}

/// Error from applying a single setting to a handle.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SettingError {
    pub message: String,
}

impl SettingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error from a fetch attempt.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct FetchFailure {
    pub message: String,
    /// True for timeouts and connection-level failures that a caller may
    /// reasonably retry.
    pub retryable: bool,
}

impl FetchFailure {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}

/// The transport seam: a blocking handle owned exclusively by one session.
pub trait TransportHandle {
    /// Applies one resolved setting. Must be idempotent per value.
    fn set(&mut self, setting: TransportSetting) -> Result<(), SettingError>;

    /// Reports whether an optional capability is available.
    fn supports(&self, capability: Capability) -> bool;

    /// Performs one blocking fetch of `url` into `sink`, appending bytes.
    /// The buffer is fully populated before this returns.
    fn fetch(&mut self, url: &Url, sink: &mut RecvBuffer) -> Result<(), FetchFailure>;

    /// Last captured transport-level error detail, when error capture is on.
    fn last_error(&self) -> Option<&str>;
}

/// Growable receive buffer owned by a session.
///
/// Grows monotonically during a fetch and is drained exactly once per
/// fetch via [`RecvBuffer::extract`].
#[derive(Debug, Default)]
pub struct RecvBuffer {
    bytes: Vec<u8>,
}

impl RecvBuffer {
    /// Creates a buffer with a reasonable initial capacity hint.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PACKET_SIZE)
    }

    /// Creates a buffer with an explicit capacity hint (not a cap).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Appends fetched bytes.
    pub fn extend_from_slice(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Transfers ownership of the received bytes out of the buffer,
    /// leaving it empty (capacity is retained for the next fetch).
    pub fn extract(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_buffer_extracts_exactly_once() {
        let mut buffer = RecvBuffer::with_capacity(16);
        buffer.extend_from_slice(b"abc");
        buffer.extend_from_slice(b"def");
        assert_eq!(buffer.len(), 6);

        let taken = buffer.extract();
        assert_eq!(taken, b"abcdef");
        assert!(buffer.is_empty());
        assert!(buffer.extract().is_empty());
    }

    #[test]
    fn link_pass_resolves_peer_before_host() {
        let pass = TransportOption::LINK_PASS;
        let peer = pass
            .iter()
            .position(|o| *o == TransportOption::VerifyPeer)
            .unwrap();
        let host = pass
            .iter()
            .position(|o| *o == TransportOption::VerifyHost)
            .unwrap();
        assert!(peer < host);
    }
}
