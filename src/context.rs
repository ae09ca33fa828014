//! Process-wide, read-only context shared by every session.
//!
//! The original design reached for ambient global state (a process temp
//! directory plus a cached resource file). Here that state is an explicit
//! [`RuntimeContext`] value passed into configuration resolution and session
//! open, so both stay testable without process-level fixtures. Sessions
//! read the context; they never mutate it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::diag::{DiagCode, SessionReport};

/// Resource-file key controlling the transport read-buffer size.
pub const RC_READ_BUFFERSIZE: &str = "HTTP.READ.BUFFERSIZE";

/// Resource-file key controlling TCP keep-alive (`on` or `idle/interval`).
pub const RC_KEEPALIVE: &str = "HTTP.KEEPALIVE";

/// Upper bound applied when the buffer-size override asks for `max`.
pub const MAX_READ_BUFFERSIZE: u64 = 512 * 1024;

/// Read-only inputs shared by every session in the process.
#[derive(Clone, Debug)]
pub struct RuntimeContext {
    /// Directory for generated cookie jars and substrate files.
    pub temp_dir: PathBuf,
    /// Parsed resource file, possibly empty.
    pub rc: RcFile,
    /// Environment snapshot taken when the context was built.
    env: HashMap<String, String>,
}

impl RuntimeContext {
    /// Builds a context from the live process environment.
    ///
    /// Looks for a resource file at `rc_path` if given, otherwise at
    /// `$HOME/.dap4rc`. A missing file yields an empty store.
    pub fn from_process(rc_path: Option<&Path>) -> Self {
        let rc = rc_path
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".dap4rc")))
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|text| RcFile::parse(&text))
            .unwrap_or_default();

        Self {
            temp_dir: std::env::temp_dir(),
            rc,
            env: std::env::vars().collect(),
        }
    }

    /// Builds a context from explicit parts. Intended for tests and
    /// embedders that manage their own configuration sources.
    pub fn new(temp_dir: PathBuf, rc: RcFile, env: HashMap<String, String>) -> Self {
        Self { temp_dir, rc, env }
    }

    /// Looks up an environment value from the snapshot.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Resolves the optional read-buffer-size override for `url`.
    ///
    /// `max` selects the transport's largest supported buffer. Anything
    /// that is not a positive integer is rejected with a warning, leaving
    /// the transport default in effect.
    pub fn read_buffersize(&self, url: &Url, report: &mut SessionReport) -> Option<u64> {
        let value = self.rc.lookup(RC_READ_BUFFERSIZE, url)?;
        if value.eq_ignore_ascii_case("max") {
            return Some(MAX_READ_BUFFERSIZE);
        }
        match value.parse::<u64>() {
            Ok(size) if size > 0 => Some(size),
            _ => {
                report.warn(
                    DiagCode::BadResourceValue,
                    format!("illegal {} value: {}", RC_READ_BUFFERSIZE, value),
                );
                None
            }
        }
    }

    /// Resolves the optional keep-alive override for `url`.
    ///
    /// The value is `on`, or `idle/interval` in seconds; a zero on either
    /// side leaves that sub-option unset.
    pub fn keepalive(&self, url: &Url, report: &mut SessionReport) -> Option<KeepAlive> {
        let value = self.rc.lookup(RC_KEEPALIVE, url)?;
        if value.eq_ignore_ascii_case("on") {
            return Some(KeepAlive {
                idle: None,
                interval: None,
            });
        }

        let parsed = value.split_once('/').and_then(|(idle, interval)| {
            Some((idle.trim().parse::<u64>().ok()?, interval.trim().parse::<u64>().ok()?))
        });
        match parsed {
            Some((idle, interval)) => Some(KeepAlive {
                idle: (idle > 0).then_some(idle),
                interval: (interval > 0).then_some(interval),
            }),
            None => {
                report.warn(
                    DiagCode::BadResourceValue,
                    format!("illegal {} value: {}", RC_KEEPALIVE, value),
                );
                None
            }
        }
    }
}

/// Active TCP keep-alive with independently optional timing overrides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct KeepAlive {
    /// Idle seconds before the first probe, when configured.
    pub idle: Option<u64>,
    /// Seconds between probes, when configured.
    pub interval: Option<u64>,
}

/// A parsed resource file: ordered `KEY=VALUE` entries, each optionally
/// scoped to a `[scheme://host:port]` prefix.
#[derive(Clone, Debug, Default)]
pub struct RcFile {
    entries: Vec<RcEntry>,
}

#[derive(Clone, Debug)]
struct RcEntry {
    /// `host` or `host:port` the entry is scoped to, lowercased.
    scope: Option<String>,
    key: String,
    value: String,
}

impl RcFile {
    /// Parses resource-file text. Unparseable lines are skipped; the
    /// format is too loose to make them fatal.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (scope, rest) = match line.strip_prefix('[') {
                Some(rest) => match rest.split_once(']') {
                    Some((scope_url, rest)) => (normalize_scope(scope_url), rest),
                    None => continue,
                },
                None => (None, line),
            };

            let Some((key, value)) = rest.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.push(RcEntry {
                scope,
                key: key.to_string(),
                value: value.trim().to_string(),
            });
        }
        Self { entries }
    }

    /// Builds a store directly from `(key, value)` pairs, unscoped.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, value)| RcEntry {
                    scope: None,
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    /// Looks up `key` for `url`. Entries scoped to the URL's host (and
    /// port, when the scope names one) win over unscoped entries; later
    /// entries win within a scope class.
    pub fn lookup(&self, key: &str, url: &Url) -> Option<&str> {
        let host_port = hostport(url);

        let mut unscoped = None;
        let mut scoped = None;
        for entry in &self.entries {
            if entry.key != key {
                continue;
            }
            match (&entry.scope, &host_port) {
                (None, _) => unscoped = Some(entry.value.as_str()),
                (Some(scope), Some(target)) if scope_matches(scope, target) => {
                    scoped = Some(entry.value.as_str())
                }
                _ => {}
            }
        }
        scoped.or(unscoped)
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All distinct keys in the store, in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let mut seen = Vec::new();
        self.entries.iter().filter_map(move |entry| {
            if seen.contains(&entry.key.as_str()) {
                None
            } else {
                seen.push(entry.key.as_str());
                Some(entry.key.as_str())
            }
        })
    }
}

impl fmt::Display for RcFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match &entry.scope {
                Some(scope) => writeln!(f, "[{}]{}={}", scope, entry.key, entry.value)?,
                None => writeln!(f, "{}={}", entry.key, entry.value)?,
            }
        }
        Ok(())
    }
}

fn normalize_scope(scope_url: &str) -> Option<String> {
    // Scopes are written as full URLs; only host:port participates in
    // matching.
    let parsed = Url::parse(scope_url.trim()).ok()?;
    hostport(&parsed)
}

fn hostport(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

fn scope_matches(scope: &str, target: &str) -> bool {
    if scope == target {
        return true;
    }
    // A port-less scope covers any port on the same host.
    !scope.contains(':')
        && target
            .split_once(':')
            .is_some_and(|(host, _)| host == scope)
}
