//! Session lifecycle management.
//!
//! A [`Session`] owns exactly one transport handle and one metadata
//! substrate, drives the open sequence (parse URL, resolve configuration,
//! apply it, fetch the manifest, hand it to the parser, build the
//! substrate), and guarantees that teardown runs on every exit path:
//! clean close, abort, or failure at any step along the way.

pub mod controls;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use url::Url;

use crate::auth::AuthContext;
use crate::context::RuntimeContext;
use crate::diag::{DiagCode, SessionReport};
use crate::error::Dap4Error;
use crate::manifest::{DmrParser, ManifestDocument, ManifestParser};
use crate::substrate::{
    DefaultSubstrateFactory, SubstrateError, SubstrateFactory, SubstrateMode, SubstrateStore,
};
use crate::transport::http::HttpTransport;
use crate::transport::resolver::{
    apply_fetch_options, apply_link_options, apply_named_options, resolve,
};
use crate::transport::{RecvBuffer, TransportConfig, TransportHandle, TransportTuning};

use controls::{constrainable, constraint_expression, query_checksum_mode, Controls};

/// Resource-file key prefix for direct transport-option overrides.
const CURL_KEY_PREFIX: &str = "CURL.";

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    Created,
    ConfigResolved,
    TransportOpen,
    ManifestFetched,
    SubstrateBuilt,
    Ready,
    Closed,
    Failed,
}

/// Caller-supplied open parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionOptions {
    /// Initial receive-buffer capacity hint; not a cap.
    pub size_hint: Option<usize>,
}

/// Creates transport handles for sessions. A seam for tests.
pub trait TransportFactory {
    fn open(&self) -> Result<Box<dyn TransportHandle>, Dap4Error>;
}

/// Default factory producing ureq-backed handles.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn open(&self) -> Result<Box<dyn TransportHandle>, Dap4Error> {
        Ok(Box::new(HttpTransport::new()))
    }
}

/// One open connection-and-metadata context against a single remote
/// data source.
///
/// Invariant: at most one live transport handle and one live substrate at
/// a time; both present when `Ready`, both absent once closed or failed.
pub struct Session {
    url: Url,
    state: SessionState,
    controls: Controls,
    auth: AuthContext,
    config: TransportConfig,
    report: SessionReport,
    substrate_name: String,

    transport: Option<Box<dyn TransportHandle>>,
    packet: Option<RecvBuffer>,
    substrate: Option<Box<dyn SubstrateStore>>,
    manifest: Option<ManifestDocument>,

    /// Cookie jar we generated ourselves; deleted at teardown.
    cookie_jar_created: Option<PathBuf>,
    /// Generated substrate file; deleted at teardown unless debug-copy.
    substrate_file: Option<PathBuf>,
}

impl Session {
    /// Opens a session with the default collaborators: ureq transport,
    /// built-in manifest parser, and the default substrate factory.
    pub fn open(
        url: &str,
        options: SessionOptions,
        ctx: &RuntimeContext,
    ) -> Result<Session, Dap4Error> {
        Session::open_with(
            url,
            options,
            ctx,
            &HttpTransportFactory,
            &DmrParser,
            &DefaultSubstrateFactory::new(&ctx.temp_dir),
        )
    }

    /// Opens a session with explicit collaborators.
    ///
    /// On any failure the partially-constructed session is torn down
    /// before the error is returned; nothing leaks.
    pub fn open_with(
        url: &str,
        options: SessionOptions,
        ctx: &RuntimeContext,
        transports: &dyn TransportFactory,
        parser: &dyn ManifestParser,
        substrates: &dyn SubstrateFactory,
    ) -> Result<Session, Dap4Error> {
        // URL parsing happens before any allocation; a malformed URL must
        // leave no trace behind.
        let parsed = Url::parse(url).map_err(|source| Dap4Error::UrlParse {
            url: url.to_string(),
            source,
        })?;

        let mut session = Session::new(parsed);
        match session.open_inner(options, ctx, transports, parser, substrates) {
            Ok(()) => Ok(session),
            Err(error) => {
                session.state = SessionState::Failed;
                session.teardown();
                Err(error)
            }
        }
    }

    fn new(url: Url) -> Session {
        Session {
            url,
            state: SessionState::Created,
            controls: Controls::default(),
            auth: AuthContext::default(),
            config: resolve(&AuthContext::default(), &TransportTuning::default()),
            report: SessionReport::new(),
            substrate_name: String::new(),
            transport: None,
            packet: None,
            substrate: None,
            manifest: None,
            cookie_jar_created: None,
            substrate_file: None,
        }
    }

    fn open_inner(
        &mut self,
        options: SessionOptions,
        ctx: &RuntimeContext,
        transports: &dyn TransportFactory,
        parser: &dyn ManifestParser,
        substrates: &dyn SubstrateFactory,
    ) -> Result<(), Dap4Error> {
        self.auth = AuthContext::load(ctx, &self.url, &mut self.report);

        // Constraints only make sense for constrainable schemes; reject
        // the conflict before any network or filesystem activity.
        if !constrainable(&self.url) {
            if let Some(expression) = constraint_expression(&self.url) {
                return Err(Dap4Error::ConstraintConflict {
                    scheme: self.url.scheme().to_string(),
                    expression,
                });
            }
        }

        self.controls = Controls::from_url(&self.url, &mut self.report);

        // Unique local substrate name: explicit override or a generated
        // placeholder.
        self.substrate_name = self
            .controls
            .substrate_name
            .clone()
            .unwrap_or_else(|| format!("tmp_{:08x}", rand::random::<u32>()));

        let tuning = TransportTuning {
            buffer_size: ctx.read_buffersize(&self.url, &mut self.report),
            keepalive: ctx.keepalive(&self.url, &mut self.report),
        };

        self.prepare_link_properties(ctx)?;
        self.config = resolve(&self.auth, &tuning);
        self.state = SessionState::ConfigResolved;

        let mut transport = transports.open()?;
        self.state = SessionState::TransportOpen;

        apply_link_options(transport.as_mut(), &self.config, &mut self.report)?;
        let extra_names: Vec<String> = ctx
            .rc
            .keys()
            .filter_map(|key| key.strip_prefix(CURL_KEY_PREFIX))
            .map(str::to_string)
            .collect();
        apply_named_options(
            transport.as_mut(),
            &self.config,
            extra_names.iter().map(String::as_str),
            &mut self.report,
        )?;
        apply_fetch_options(transport.as_mut(), &self.config, &mut self.report)?;

        let mut packet = match options.size_hint {
            Some(hint) => RecvBuffer::with_capacity(hint),
            None => RecvBuffer::new(),
        };

        self.make_substrate(substrates)?;
        // Start from a clean slate: no stale metadata, no stale temp file.
        self.reset_for_read()?;

        let manifest_url = manifest_url(&self.url);
        if self.controls.show_fetch {
            self.report
                .note(DiagCode::ShowFetch, format!("fetch: {}", manifest_url));
        }
        transport
            .fetch(&manifest_url, &mut packet)
            .map_err(|failure| Dap4Error::Fetch {
                url: manifest_url.to_string(),
                message: match transport.last_error() {
                    Some(detail) if detail != failure.message => {
                        format!("{} ({})", failure.message, detail)
                    }
                    _ => failure.message,
                },
            })?;
        self.state = SessionState::ManifestFetched;

        // The buffer is drained exactly once per fetch.
        let length = packet.len();
        let raw = packet.extract();
        self.transport = Some(transport);
        self.packet = Some(packet);

        let manifest = parser.parse(raw).map_err(|source| Dap4Error::ManifestDecode {
            length,
            message: source.message,
        })?;

        self.controls.checksum_mode = query_checksum_mode(&self.url, &mut self.report);

        if let Some(substrate) = self.substrate.as_mut() {
            match substrate.build(&manifest) {
                Ok(()) => {}
                // A too-large variable stops the build early but leaves
                // the session usable.
                Err(SubstrateError::VariableTooLarge(message)) => {
                    self.report.warn(DiagCode::VariableTooLarge, message);
                }
                Err(source) => {
                    return Err(map_substrate_error(&self.substrate_name, source));
                }
            }
        }
        self.state = SessionState::SubstrateBuilt;

        self.manifest = Some(manifest);
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Link-level fixups that precede resolution: default user agent and
    /// a usable cookie jar.
    fn prepare_link_properties(&mut self, ctx: &RuntimeContext) -> Result<(), Dap4Error> {
        if self.auth.user_agent.is_none() {
            self.auth.user_agent = Some(format!("dap4link/{}", env!("CARGO_PKG_VERSION")));
        }

        // A configured-but-empty jar path means "unset".
        if self
            .auth
            .cookie_jar
            .as_ref()
            .is_some_and(|jar| jar.as_os_str().is_empty())
        {
            self.auth.cookie_jar = None;
        }

        // Some servers require a cookie jar for their auth flows to work,
        // so make sure one exists.
        let jar = match self.auth.cookie_jar.clone() {
            Some(jar) => jar,
            None => {
                let path = ctx
                    .temp_dir
                    .join(format!("dap4cookies_{:08x}", rand::random::<u32>()));
                self.auth.cookie_jar = Some(path.clone());
                self.cookie_jar_created = Some(path.clone());
                path
            }
        };
        probe_cookie_jar(&jar)
    }

    fn make_substrate(&mut self, substrates: &dyn SubstrateFactory) -> Result<(), Dap4Error> {
        // Re-creating the substrate resets any previous one first.
        if let Some(mut old) = self.substrate.take() {
            let _ = old.abort();
        }

        let mode = if self.controls.debug_copy {
            SubstrateMode::FileBacked
        } else {
            SubstrateMode::InMemory
        };
        let store = substrates
            .create(&self.substrate_name, mode, true)
            .map_err(|source| map_substrate_error(&self.substrate_name, source))?;
        if store.file_backed() {
            self.substrate_file = store.path().map(Path::to_path_buf);
        }
        self.substrate = Some(store);
        Ok(())
    }

    /// Closes the session. Under debug-copy the substrate is persisted
    /// first and a copy failure is reported, but teardown runs
    /// regardless, so resources are never leaked even on error.
    pub fn close(&mut self) -> Result<(), Dap4Error> {
        if self.state == SessionState::Closed {
            return Err(Dap4Error::AlreadyClosed);
        }

        let result = match self.substrate.as_mut() {
            Some(substrate) if self.controls.debug_copy => substrate
                .persist()
                .map_err(|source| map_substrate_error(&self.substrate_name, source)),
            Some(substrate) => substrate
                .abort()
                .map_err(|source| map_substrate_error(&self.substrate_name, source)),
            None => Ok(()),
        };

        self.teardown();
        self.state = SessionState::Closed;
        result
    }

    /// Discards the session without persisting anything, mirroring the
    /// transport layer's abort semantics.
    pub fn abort(&mut self) -> Result<(), Dap4Error> {
        if self.state == SessionState::Closed {
            return Err(Dap4Error::AlreadyClosed);
        }
        let result = match self.substrate.as_mut() {
            Some(substrate) => substrate
                .abort()
                .map_err(|source| map_substrate_error(&self.substrate_name, source)),
            None => Ok(()),
        };
        self.teardown();
        self.state = SessionState::Closed;
        result
    }

    /// Drops the current metadata tree (and a non-debug temp substrate
    /// file) so the session can re-fetch a manifest without losing its
    /// transport and auth state.
    pub fn reset_for_read(&mut self) -> Result<(), Dap4Error> {
        self.manifest = None;
        if !self.controls.debug_copy {
            if let Some(path) = &self.substrate_file {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }

    /// Releases every owned resource. Safe to call on a partially
    /// constructed session, and safe to call more than once.
    fn teardown(&mut self) {
        self.transport = None;
        self.packet = None;
        self.substrate = None;
        self.manifest = None;

        if let Some(path) = self.substrate_file.take() {
            if !self.controls.debug_copy {
                let _ = std::fs::remove_file(path);
            }
        }
        if let Some(jar) = self.cookie_jar_created.take() {
            let _ = std::fs::remove_file(jar);
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn manifest(&self) -> Option<&ManifestDocument> {
        self.manifest.as_ref()
    }

    /// Path of the debug-copy substrate file, when one exists.
    pub fn substrate_file(&self) -> Option<&Path> {
        self.substrate_file.as_deref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropping an open session behaves like abort.
        self.teardown();
    }
}

/// The manifest for a dataset lives next to it: same path with a
/// `.dmr.xml` suffix, query preserved, fragment stripped.
fn manifest_url(url: &Url) -> Url {
    let mut manifest = url.clone();
    manifest.set_fragment(None);
    let path = format!("{}.dmr.xml", url.path());
    manifest.set_path(&path);
    manifest
}

/// The jar must exist and be both readable and writable before the
/// transport touches it.
fn probe_cookie_jar(jar: &Path) -> Result<(), Dap4Error> {
    let probe = if jar.exists() {
        OpenOptions::new().read(true).write(true).open(jar)
    } else {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(jar)
    };
    probe
        .map(|_| ())
        .map_err(|source| Dap4Error::Resource {
            path: jar.to_path_buf(),
            message: format!("cookie file cannot be read and written: {}", source),
        })
}

fn map_substrate_error(name: &str, source: SubstrateError) -> Dap4Error {
    match source {
        SubstrateError::Io { path, source } => Dap4Error::Resource {
            path,
            message: source.to_string(),
        },
        other => Dap4Error::SubstrateBuild {
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_url_appends_suffix_and_keeps_query() {
        let url = Url::parse("http://h:8080/data/set1?dap4.ce=x#debug=copy").unwrap();
        let manifest = manifest_url(&url);
        assert_eq!(
            manifest.as_str(),
            "http://h:8080/data/set1.dmr.xml?dap4.ce=x"
        );
    }

    #[test]
    fn probe_creates_missing_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("jar.txt");
        probe_cookie_jar(&jar).unwrap();
        assert!(jar.exists());
    }

    #[test]
    fn probe_fails_on_unwritable_location() {
        let jar = Path::new("/definitely/not/a/real/dir/jar.txt");
        assert!(matches!(
            probe_cookie_jar(jar),
            Err(Dap4Error::Resource { .. })
        ));
    }
}
