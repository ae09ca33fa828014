//! Session diagnostics for dap4link.
//!
//! Warnings in this layer never abort an operation: an unrecognized
//! fragment flag, a bogus checksum value, or a malformed resource-file
//! number all fall back to a documented default. They are recorded on a
//! [`SessionReport`] so callers (and tests) can inspect exactly what was
//! ignored, and mirrored through the `log` facade for ambient visibility.

mod report;

pub use report::{DiagCode, Diagnostic, Severity, SessionReport};
