//! Criterion microbenches for configuration resolution and URL control
//! parsing.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use dap4link::auth::{AuthContext, Credentials, TriState};
use dap4link::context::RcFile;
use dap4link::diag::SessionReport;
use dap4link::session::controls::Controls;
use dap4link::transport::resolver::resolve;
use dap4link::transport::TransportTuning;
use url::Url;

const RC_FIXTURE: &str = "\
HTTP.TIMEOUT=30
HTTP.USERAGENT=bench/1
[http://example.com:8080]HTTP.TIMEOUT=99
[http://example.com:8080]HTTP.DEFLATE=1
HTTP.CREDENTIALS.USERNAME=alice
HTTP.CREDENTIALS.PASSWORD=secret
CURL.MAXREDIRS=ignored
";

const CONTROL_URL: &str =
    "http://example.com/data/set1?dap4.ce=temp&dap4.checksum=true#show=fetch&debug=copy&opaquesize=64&substratename=sub1";

/// Benchmark full configuration resolution from a populated auth context.
fn bench_resolve(c: &mut Criterion) {
    let mut auth = AuthContext::default();
    auth.user_agent = Some("bench/1".to_string());
    auth.timeout = Some(30);
    auth.credentials = Credentials {
        user: Some("alice".to_string()),
        password: Some("secret".to_string()),
    };
    auth.ssl.verify_peer = TriState::Off;
    let tuning = TransportTuning {
        buffer_size: Some(65536),
        keepalive: None,
    };

    c.bench_function("resolve_config", |b| {
        b.iter(|| black_box(resolve(black_box(&auth), black_box(&tuning))))
    });
}

/// Benchmark resource-file parsing plus a scoped lookup.
fn bench_rc_parse(c: &mut Criterion) {
    let url = Url::parse("http://example.com:8080/data").unwrap();
    let mut group = c.benchmark_group("rc_file");
    group.throughput(Throughput::Bytes(RC_FIXTURE.len() as u64));

    group.bench_function("parse_and_lookup", |b| {
        b.iter(|| {
            let rc = RcFile::parse(black_box(RC_FIXTURE));
            black_box(rc.lookup("HTTP.TIMEOUT", &url))
                .map(str::to_string)
        })
    });

    group.finish();
}

/// Benchmark fragment-control parsing from a fully loaded URL.
fn bench_controls_parse(c: &mut Criterion) {
    let url = Url::parse(CONTROL_URL).unwrap();

    c.bench_function("controls_from_url", |b| {
        b.iter(|| {
            let mut report = SessionReport::new();
            black_box(Controls::from_url(black_box(&url), &mut report))
        })
    });
}

criterion_group!(benches, bench_resolve, bench_rc_parse, bench_controls_parse);
criterion_main!(benches);
