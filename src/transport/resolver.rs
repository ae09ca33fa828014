//! Pure resolution of session state into transport settings, plus the
//! ordered pipeline that applies them to a handle.
//!
//! `resolve` is deterministic: the same auth context and tuning always
//! produce an identical [`TransportConfig`]. Applying is fail-fast: the
//! first setting a handle rejects aborts the pass, and earlier settings
//! are deliberately not rolled back (session teardown owns cleanup).

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::auth::{AuthContext, TriState};
use crate::context::KeepAlive;
use crate::diag::{DiagCode, SessionReport};
use crate::error::Dap4Error;

use super::{Capability, TransportHandle, TransportOption, TransportSetting};

/// Redirects are always followed, bounded here. Not configurable.
pub const MAX_REDIRECTS: u32 = 20;

/// Per-link tuning read from the resource file (buffer size, keep-alive).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransportTuning {
    pub buffer_size: Option<u64>,
    pub keepalive: Option<KeepAlive>,
}

/// Resolved user/password pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedCredentials {
    pub user: String,
    pub password: String,
}

/// Resolved proxy descriptor. Present only when a proxy host is
/// configured; credentials only when both halves were present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedProxy {
    pub host: String,
    pub port: u16,
    pub credentials: Option<ResolvedCredentials>,
}

/// The complete, immutable-per-fetch transport configuration.
///
/// Every optional field keeps a distinct "unset" representation; the
/// mandatory fields (`follow_redirects`, `max_redirects`, `error_capture`)
/// are fixed at resolution time and always applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransportConfig {
    pub accept_encodings: bool,
    pub netrc: Option<NetrcMode>,
    pub verbose: bool,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub cookie_jar: Option<PathBuf>,
    pub credentials: Option<ResolvedCredentials>,
    pub proxy: Option<ResolvedProxy>,
    pub verify_peer: TriState,
    pub verify_host: TriState,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub client_key_password: Option<String>,
    pub ca_info: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub error_capture: bool,
    pub buffer_size: Option<u64>,
    pub keepalive: Option<KeepAlive>,
}

/// Netrc in optional mode: a missing entry never hard-fails a fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetrcMode {
    /// Explicit netrc file; `None` selects the default discovery location.
    pub file: Option<PathBuf>,
}

/// Maps auth state and tuning onto a complete transport configuration.
///
/// This is where the coupling and pairing policies live, so that the
/// apply pipeline below stays a straight walk over settled values:
/// - credentials and proxy credentials are kept only as complete pairs;
/// - an explicit verify-peer "off" forces verify-host off, before host
///   verification is ever looked at.
pub fn resolve(auth: &AuthContext, tuning: &TransportTuning) -> TransportConfig {
    let credentials = auth
        .credentials
        .pair()
        .map(|(user, password)| ResolvedCredentials {
            user: user.to_string(),
            password: password.to_string(),
        });

    let proxy = auth.proxy.host.as_ref().map(|host| ResolvedProxy {
        host: host.clone(),
        port: auth.proxy.port,
        credentials: auth
            .proxy
            .credentials
            .pair()
            .map(|(user, password)| ResolvedCredentials {
                user: user.to_string(),
                password: password.to_string(),
            }),
    });

    let verify_peer = auth.ssl.verify_peer;
    let verify_host = if verify_peer == TriState::Off {
        TriState::Off
    } else {
        auth.ssl.verify_host
    };

    TransportConfig {
        accept_encodings: auth.accept_encodings,
        netrc: auth.netrc.then(|| NetrcMode {
            file: auth.netrc_file.clone(),
        }),
        verbose: auth.verbose,
        timeout_secs: auth.timeout,
        connect_timeout_secs: auth.connect_timeout,
        user_agent: auth.user_agent.clone(),
        cookie_jar: auth.cookie_jar.clone(),
        credentials,
        proxy,
        verify_peer,
        verify_host,
        client_cert: auth.ssl.certificate.clone(),
        client_key: auth.ssl.key.clone(),
        client_key_password: auth.ssl.key_password.clone(),
        ca_info: auth.ssl.ca_info.clone(),
        ca_path: auth.ssl.ca_path.clone(),
        follow_redirects: true,
        max_redirects: MAX_REDIRECTS,
        error_capture: true,
        buffer_size: tuning.buffer_size,
        keepalive: tuning.keepalive,
    }
}

/// Applies the full link-level pass to `handle`, in the fixed order.
pub fn apply_link_options(
    handle: &mut dyn TransportHandle,
    config: &TransportConfig,
    report: &mut SessionReport,
) -> Result<(), Dap4Error> {
    for option in TransportOption::LINK_PASS {
        apply_option(handle, config, *option, report)?;
    }
    Ok(())
}

/// Applies the per-fetch pass. Currently an empty set.
pub fn apply_fetch_options(
    handle: &mut dyn TransportHandle,
    config: &TransportConfig,
    report: &mut SessionReport,
) -> Result<(), Dap4Error> {
    for option in TransportOption::FETCH_PASS {
        apply_option(handle, config, *option, report)?;
    }
    Ok(())
}

/// Re-applies options named by `CURL.*` resource-file keys.
///
/// Unrecognized names warn and are skipped (see DESIGN.md).
pub fn apply_named_options<'a>(
    handle: &mut dyn TransportHandle,
    config: &TransportConfig,
    names: impl IntoIterator<Item = &'a str>,
    report: &mut SessionReport,
) -> Result<(), Dap4Error> {
    for name in names {
        match option_by_name(name) {
            Some(option) => apply_option(handle, config, option, report)?,
            None => report.warn(
                DiagCode::UnknownTransportOption,
                format!("attempt to update unexpected transport option: {}", name),
            ),
        }
    }
    Ok(())
}

/// Maps a curl-style option name to its identifier.
pub fn option_by_name(name: &str) -> Option<TransportOption> {
    let option = match name.to_ascii_uppercase().as_str() {
        "ACCEPT_ENCODING" => TransportOption::Encoding,
        "NETRC" | "NETRC_FILE" => TransportOption::Netrc,
        "VERBOSE" => TransportOption::Verbose,
        "TIMEOUT" | "CONNECTTIMEOUT" => TransportOption::Timeout,
        "USERAGENT" => TransportOption::UserAgent,
        "COOKIEJAR" | "COOKIEFILE" => TransportOption::CookieJar,
        "USERPWD" => TransportOption::Credentials,
        "PROXY" => TransportOption::Proxy,
        "SSL_VERIFYPEER" => TransportOption::VerifyPeer,
        "SSL_VERIFYHOST" => TransportOption::VerifyHost,
        "SSLCERT" => TransportOption::ClientCert,
        "SSLKEY" => TransportOption::ClientKey,
        "CAINFO" => TransportOption::CaInfo,
        "CAPATH" => TransportOption::CaPath,
        "USE_SSL" => TransportOption::ProtocolRestriction,
        "FOLLOWLOCATION" => TransportOption::FollowRedirects,
        "MAXREDIRS" => TransportOption::MaxRedirects,
        "ERRORBUFFER" => TransportOption::ErrorCapture,
        "BUFFERSIZE" => TransportOption::BufferSize,
        "TCP_KEEPALIVE" => TransportOption::KeepAlive,
        _ => return None,
    };
    Some(option)
}

/// Applies one option. Absent optional state is a valid, silently-skipped
/// case for everything except the unconditional options.
fn apply_option(
    handle: &mut dyn TransportHandle,
    config: &TransportConfig,
    option: TransportOption,
    report: &mut SessionReport,
) -> Result<(), Dap4Error> {
    let mut settings: Vec<TransportSetting> = Vec::new();

    match option {
        TransportOption::Encoding => {
            settings.push(TransportSetting::AcceptEncodings(config.accept_encodings));
        }
        TransportOption::Netrc => {
            if let Some(netrc) = &config.netrc {
                if handle.supports(Capability::Netrc) {
                    settings.push(TransportSetting::Netrc {
                        file: netrc.file.clone(),
                    });
                } else {
                    warn_unsupported(report, option);
                }
            }
        }
        TransportOption::Verbose => {
            if config.verbose {
                settings.push(TransportSetting::Verbose(true));
            }
        }
        TransportOption::Timeout => {
            if let Some(secs) = config.timeout_secs {
                settings.push(TransportSetting::Timeout(Duration::from_secs(secs)));
            }
            if let Some(secs) = config.connect_timeout_secs {
                settings.push(TransportSetting::ConnectTimeout(Duration::from_secs(secs)));
            }
        }
        TransportOption::UserAgent => {
            if let Some(agent) = &config.user_agent {
                settings.push(TransportSetting::UserAgent(agent.clone()));
            }
        }
        TransportOption::CookieJar => {
            if let Some(jar) = &config.cookie_jar {
                settings.push(TransportSetting::CookieJar(jar.clone()));
            }
        }
        TransportOption::Credentials => {
            if let Some(credentials) = &config.credentials {
                settings.push(TransportSetting::Credentials {
                    user: credentials.user.clone(),
                    password: credentials.password.clone(),
                });
            }
        }
        TransportOption::Proxy => {
            if let Some(proxy) = &config.proxy {
                settings.push(TransportSetting::Proxy {
                    host: proxy.host.clone(),
                    port: proxy.port,
                    credentials: proxy
                        .credentials
                        .as_ref()
                        .map(|c| (c.user.clone(), c.password.clone())),
                });
            }
        }
        TransportOption::VerifyPeer => {
            if let Some(on) = explicit(config.verify_peer) {
                settings.push(TransportSetting::VerifyPeer(on));
            }
        }
        TransportOption::VerifyHost => {
            if let Some(on) = explicit(config.verify_host) {
                settings.push(TransportSetting::VerifyHost(on));
            }
        }
        TransportOption::ClientCert => {
            if let Some(cert) = &config.client_cert {
                if handle.supports(Capability::ClientTls) {
                    settings.push(TransportSetting::ClientCert(cert.clone()));
                } else {
                    warn_unsupported(report, option);
                }
            }
        }
        TransportOption::ClientKey => {
            if let Some(key) = &config.client_key {
                if handle.supports(Capability::ClientTls) {
                    settings.push(TransportSetting::ClientKey {
                        path: key.clone(),
                        password: config.client_key_password.clone(),
                    });
                } else {
                    warn_unsupported(report, option);
                }
            }
        }
        TransportOption::CaInfo => {
            if let Some(ca) = &config.ca_info {
                if handle.supports(Capability::ClientTls) {
                    settings.push(TransportSetting::CaInfo(ca.clone()));
                } else {
                    warn_unsupported(report, option);
                }
            }
        }
        TransportOption::CaPath => {
            if let Some(ca) = &config.ca_path {
                if handle.supports(Capability::ClientTls) {
                    settings.push(TransportSetting::CaPath(ca.clone()));
                } else {
                    warn_unsupported(report, option);
                }
            }
        }
        TransportOption::ProtocolRestriction => {
            // Scheme restriction is enforced at session open; nothing to
            // push onto the handle.
        }
        TransportOption::FollowRedirects => {
            settings.push(TransportSetting::FollowRedirects(config.follow_redirects));
        }
        TransportOption::MaxRedirects => {
            settings.push(TransportSetting::MaxRedirects(config.max_redirects));
        }
        TransportOption::ErrorCapture => {
            settings.push(TransportSetting::ErrorCapture(config.error_capture));
        }
        TransportOption::BufferSize => {
            if let Some(size) = config.buffer_size {
                if size > 0 && handle.supports(Capability::ReadBufferSize) {
                    settings.push(TransportSetting::ReadBufferSize(size));
                }
            }
        }
        TransportOption::KeepAlive => {
            if let Some(keepalive) = config.keepalive {
                if handle.supports(Capability::KeepAlive) {
                    settings.push(TransportSetting::KeepAlive {
                        idle: keepalive.idle.filter(|v| *v > 0),
                        interval: keepalive.interval.filter(|v| *v > 0),
                    });
                }
            }
        }
    }

    for setting in settings {
        handle
            .set(setting)
            .map_err(|source| Dap4Error::TransportConfig {
                option,
                message: source.message,
            })?;
    }
    Ok(())
}

fn explicit(state: TriState) -> Option<bool> {
    match state {
        TriState::Unset => None,
        TriState::Off => Some(false),
        TriState::On => Some(true),
    }
}

fn warn_unsupported(report: &mut SessionReport, option: TransportOption) {
    report.warn(
        DiagCode::UnsupportedTransportOption,
        format!(
            "transport option {:?} is configured but not supported by this handle",
            option
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, ProxyConfig};

    fn auth_with_proxy(user: Option<&str>, password: Option<&str>) -> AuthContext {
        AuthContext {
            proxy: ProxyConfig {
                host: Some("proxy.local".to_string()),
                port: 3128,
                credentials: Credentials {
                    user: user.map(str::to_string),
                    password: password.map(str::to_string),
                },
            },
            ..AuthContext::default()
        }
    }

    #[test]
    fn verify_peer_off_forces_verify_host_off() {
        let mut auth = AuthContext::default();
        auth.ssl.verify_peer = TriState::Off;
        auth.ssl.verify_host = TriState::On;

        let config = resolve(&auth, &TransportTuning::default());
        assert_eq!(config.verify_peer, TriState::Off);
        assert_eq!(config.verify_host, TriState::Off);
    }

    #[test]
    fn verify_peer_unset_leaves_verify_host_alone() {
        let mut auth = AuthContext::default();
        auth.ssl.verify_host = TriState::On;

        let config = resolve(&auth, &TransportTuning::default());
        assert_eq!(config.verify_peer, TriState::Unset);
        assert_eq!(config.verify_host, TriState::On);
    }

    #[test]
    fn half_a_credential_pair_is_dropped() {
        let auth = AuthContext {
            credentials: Credentials {
                user: Some("alice".to_string()),
                password: None,
            },
            ..AuthContext::default()
        };
        let config = resolve(&auth, &TransportTuning::default());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn proxy_credentials_require_both_halves() {
        let config = resolve(&auth_with_proxy(Some("u"), None), &TransportTuning::default());
        let proxy = config.proxy.expect("proxy host configured");
        assert!(proxy.credentials.is_none());

        let config = resolve(
            &auth_with_proxy(Some("u"), Some("p")),
            &TransportTuning::default(),
        );
        assert!(config.proxy.unwrap().credentials.is_some());
    }

    #[test]
    fn mandatory_options_are_fixed() {
        let config = resolve(&AuthContext::default(), &TransportTuning::default());
        assert!(config.follow_redirects);
        assert_eq!(config.max_redirects, MAX_REDIRECTS);
        assert!(config.error_capture);
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut auth = AuthContext::default();
        auth.user_agent = Some("agent/1".to_string());
        auth.ssl.verify_peer = TriState::On;
        let tuning = TransportTuning {
            buffer_size: Some(4096),
            keepalive: None,
        };

        assert_eq!(resolve(&auth, &tuning), resolve(&auth, &tuning));
    }

    #[test]
    fn unknown_option_names_are_rejected() {
        assert_eq!(option_by_name("MAXREDIRS"), Some(TransportOption::MaxRedirects));
        assert_eq!(option_by_name("FTP_PORT"), None);
    }
}
