//! Fuzz target for URL fragment-control parsing.
//!
//! Feeds arbitrary strings through URL parsing and the fragment-control
//! resolver, checking for panics or hangs.
//!
//! Run with:
//!   cargo +nightly fuzz run fragment_controls_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use dap4link::session::controls::fuzz_controls_from_url;

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = fuzz_controls_from_url(text);
    }
});
