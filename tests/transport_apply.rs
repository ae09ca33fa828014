use std::collections::HashMap;

use dap4link::auth::{AuthContext, TriState};
use dap4link::context::{RcFile, RuntimeContext};
use dap4link::diag::{DiagCode, SessionReport};
use dap4link::session::{Session, SessionOptions, SessionState};
use dap4link::transport::resolver::{apply_link_options, apply_named_options, resolve};
use dap4link::transport::{TransportSetting, TransportTuning};

mod common;

use common::ScriptedTransportFactory;

#[test]
fn link_pass_applies_encoding_first_and_error_capture_last() {
    let mut auth = AuthContext::default();
    auth.accept_encodings = true;
    auth.user_agent = Some("probe/1".to_string());
    auth.ssl.verify_peer = TriState::Off;
    let config = resolve(&auth, &TransportTuning::default());

    let transports = ScriptedTransportFactory::responding(b"");
    let mut handle = transports.open_handle();
    let mut report = SessionReport::new();
    apply_link_options(handle.as_mut(), &config, &mut report).unwrap();

    let settings = transports.settings();
    assert_eq!(settings[0], TransportSetting::AcceptEncodings(true));
    assert_eq!(
        settings.last(),
        Some(&TransportSetting::ErrorCapture(true))
    );

    // Peer-off was coupled into host-off, and peer lands first.
    let peer = settings
        .iter()
        .position(|s| *s == TransportSetting::VerifyPeer(false))
        .expect("peer setting applied");
    let host = settings
        .iter()
        .position(|s| *s == TransportSetting::VerifyHost(false))
        .expect("host setting applied");
    assert!(peer < host);
}

#[test]
fn named_pass_warns_on_unknown_names_and_applies_known_ones() {
    let config = resolve(&AuthContext::default(), &TransportTuning::default());

    let transports = ScriptedTransportFactory::responding(b"");
    let mut handle = transports.open_handle();
    let mut report = SessionReport::new();
    apply_named_options(
        handle.as_mut(),
        &config,
        ["MAXREDIRS", "FTP_PORT", "NOSUCHOPT"],
        &mut report,
    )
    .unwrap();

    assert_eq!(transports.settings(), vec![TransportSetting::MaxRedirects(20)]);
    assert_eq!(report.warning_count(), 2);
    assert!(report.has_warning(DiagCode::UnknownTransportOption));
}

#[test]
fn curl_rc_keys_feed_the_named_pass_during_open() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuntimeContext::new(
        dir.path().to_path_buf(),
        RcFile::from_pairs([("CURL.MAXREDIRS", "x"), ("CURL.FTP_PORT", "x")]),
        HashMap::new(),
    );
    let transports = ScriptedTransportFactory::responding(b"<Dataset/>");

    let mut session = Session::open_with(
        "http://example.com/data",
        SessionOptions::default(),
        &ctx,
        &transports,
        &dap4link::manifest::DmrParser,
        &dap4link::substrate::DefaultSubstrateFactory::new(&ctx.temp_dir),
    )
    .unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    // The known name re-applied max-redirects; the unknown one only warned.
    assert_eq!(
        transports
            .settings()
            .iter()
            .filter(|s| **s == TransportSetting::MaxRedirects(20))
            .count(),
        2
    );
    assert!(session
        .report()
        .has_warning(DiagCode::UnknownTransportOption));
    session.close().unwrap();
}

#[test]
fn rc_scoped_timeout_reaches_the_handle() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuntimeContext::new(
        dir.path().to_path_buf(),
        RcFile::parse("HTTP.TIMEOUT=7\n[http://other.com]HTTP.TIMEOUT=99\n"),
        HashMap::new(),
    );
    let transports = ScriptedTransportFactory::responding(b"<Dataset/>");

    let mut session = Session::open_with(
        "http://example.com/data",
        SessionOptions::default(),
        &ctx,
        &transports,
        &dap4link::manifest::DmrParser,
        &dap4link::substrate::DefaultSubstrateFactory::new(&ctx.temp_dir),
    )
    .unwrap();

    assert!(transports.settings().contains(&TransportSetting::Timeout(
        std::time::Duration::from_secs(7)
    )));
    session.close().unwrap();
}
