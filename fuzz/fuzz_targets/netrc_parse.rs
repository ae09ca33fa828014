//! Fuzz target for netrc credential lookup.
//!
//! Run with:
//!   cargo +nightly fuzz run netrc_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use dap4link::transport::http::fuzz_netrc_lookup;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = fuzz_netrc_lookup(text, "example.com");
    }
});
