//! Fuzz target for resource-file parsing and scoped lookup.
//!
//! Run with:
//!   cargo +nightly fuzz run rc_file_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use dap4link::context::RcFile;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let rc = RcFile::parse(text);
        let url = url::Url::parse("http://example.com:8080/data").unwrap();
        let _ = rc.lookup("HTTP.TIMEOUT", &url);
        let _ = rc.keys().count();
    }
});
