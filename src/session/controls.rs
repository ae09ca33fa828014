//! Client-supplied controls carried on the source URL itself.
//!
//! Fragment keys tune how the session behaves (`#debug=copy&show=fetch`);
//! one query key controls checksum verification. Every control is
//! independently optional, and a bad value never fails the open; it
//! warns and falls back to the documented default.

use serde::Serialize;
use url::Url;

use crate::diag::{DiagCode, SessionReport};

/// Schemes that accept request-time constraint expressions.
pub const CONSTRAINABLE_SCHEMES: &[&str] = &["http", "https"];

/// Query key carrying a constraint expression.
pub const CONSTRAINT_KEY: &str = "dap4.ce";

/// Query key controlling checksum verification.
pub const CHECKSUM_KEY: &str = "dap4.checksum";

/// Default opaque-size threshold (bytes) when the fragment is absent or
/// unusable.
pub const DEFAULT_OPAQUE_SIZE: usize = 8;

/// Checksums are verified unless the caller turns them off.
pub const DEFAULT_CHECKSUM_STATE: bool = true;

/// Characters that may terminate a subkey inside a fragment value list.
const CHECK_SEPARATORS: &[char] = &['+', ',', ':', ';'];

/// Translation mode requested by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Translation {
    #[default]
    None,
    Nc4,
}

/// Policy when a variable's fill value disagrees with its declared type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum FillMismatch {
    /// Tolerate the mismatch (default).
    #[default]
    Allow,
    /// Treat the mismatch as an error.
    Fail,
}

/// All fragment-level controls, resolved once at open time.
#[derive(Clone, Debug, Serialize)]
pub struct Controls {
    pub show_fetch: bool,
    pub translation: Translation,
    pub debug_copy: bool,
    pub substrate_name: Option<String>,
    /// Assume checksums are present but ignore them (`hyrax`).
    pub checksum_ignore: bool,
    pub opaque_size: usize,
    pub fill_mismatch: FillMismatch,
    pub log_level: Option<String>,
    /// Query-level checksum verification switch.
    pub checksum_mode: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            show_fetch: false,
            translation: Translation::None,
            debug_copy: false,
            substrate_name: None,
            checksum_ignore: false,
            opaque_size: DEFAULT_OPAQUE_SIZE,
            fill_mismatch: FillMismatch::Allow,
            log_level: None,
            checksum_mode: DEFAULT_CHECKSUM_STATE,
        }
    }
}

impl Controls {
    /// Resolves every fragment control from `url`. Later controls never
    /// reset earlier unrelated ones.
    pub fn from_url(url: &Url, report: &mut SessionReport) -> Self {
        let mut controls = Controls::default();

        if fragment_check(url, "show", Some("fetch")) {
            controls.show_fetch = true;
        }
        if fragment_check(url, "translate", Some("nc4")) {
            controls.translation = Translation::Nc4;
        }
        if fragment_check(url, "debug", Some("copy")) {
            controls.debug_copy = true;
        }
        if let Some(name) = fragment_value(url, "substratename") {
            if !name.is_empty() {
                controls.substrate_name = Some(name.to_string());
            }
        }
        if fragment_value(url, "hyrax").is_some() {
            controls.checksum_ignore = true;
        }
        if let Some(value) = fragment_value(url, "opaquesize") {
            match value.parse::<usize>() {
                Ok(size) if size > 0 => controls.opaque_size = size,
                _ => report.warn(
                    DiagCode::BadFragmentValue,
                    format!("bad [opaquesize] tag: {}", value),
                ),
            }
        }
        if fragment_value(url, "fillmismatch").is_some() {
            controls.fill_mismatch = FillMismatch::Allow;
        }
        if fragment_value(url, "nofillmismatch").is_some() {
            controls.fill_mismatch = FillMismatch::Fail;
        }
        if let Some(level) = fragment_value(url, "log") {
            let level = if level.is_empty() { "info" } else { level };
            match level.parse::<log::LevelFilter>() {
                Ok(filter) => {
                    log::set_max_level(filter);
                    controls.log_level = Some(level.to_string());
                }
                Err(_) => report.warn(
                    DiagCode::BadFragmentValue,
                    format!("bad [log] tag: {}", level),
                ),
            }
        }

        controls
    }
}

/// Resolves the checksum query control: case-insensitive true/false,
/// default (with a warning) on anything else. Applied after the manifest
/// is parsed, separately from the fragment pass.
pub fn query_checksum_mode(url: &Url, report: &mut SessionReport) -> bool {
    match query_value(url, CHECKSUM_KEY) {
        None => DEFAULT_CHECKSUM_STATE,
        Some(value) if value.eq_ignore_ascii_case("false") => false,
        Some(value) if value.eq_ignore_ascii_case("true") => true,
        Some(value) => {
            report.warn(
                DiagCode::BadChecksumValue,
                format!("unknown checksum mode: {} ; using default", value),
            );
            DEFAULT_CHECKSUM_STATE
        }
    }
}

/// True when `url`'s scheme supports constraint expressions.
pub fn constrainable(url: &Url) -> bool {
    CONSTRAINABLE_SCHEMES.contains(&url.scheme())
}

/// The constraint expression carried in the query, if any.
pub fn constraint_expression(url: &Url) -> Option<String> {
    query_value(url, CONSTRAINT_KEY)
}

/// Fragment lookup: `key=value` yields the value, a bare `key` yields an
/// empty string, absence yields `None`. Keys are case-sensitive.
pub fn fragment_value<'a>(url: &'a Url, key: &str) -> Option<&'a str> {
    let fragment = url.fragment()?;
    for pair in fragment.split('&') {
        match pair.split_once('=') {
            Some((k, v)) if k == key => return Some(v),
            None if pair == key => return Some(""),
            _ => {}
        }
    }
    None
}

/// True when fragment `key` is present and, if `subkey` is given, its
/// value contains `subkey` terminated by end-of-value or a separator.
pub fn fragment_check(url: &Url, key: &str, subkey: Option<&str>) -> bool {
    let Some(value) = fragment_value(url, key) else {
        return false;
    };
    let Some(subkey) = subkey else {
        return true;
    };
    let Some(position) = value.find(subkey) else {
        return false;
    };
    match value[position + subkey.len()..].chars().next() {
        None => true,
        Some(next) => CHECK_SEPARATORS.contains(&next),
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Entry point for the fragment-control fuzz target.
#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_controls_from_url(url: &str) -> Option<Controls> {
    let url = Url::parse(url).ok()?;
    let mut report = SessionReport::new();
    Some(Controls::from_url(&url, &mut report))
}
