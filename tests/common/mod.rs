use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use url::Url;

use dap4link::error::Dap4Error;
use dap4link::manifest::{ManifestDocument, ManifestError, ManifestParser};
use dap4link::session::TransportFactory;
use dap4link::substrate::{SubstrateError, SubstrateFactory, SubstrateMode, SubstrateStore};
use dap4link::transport::{
    Capability, FetchFailure, RecvBuffer, SettingError, TransportHandle, TransportSetting,
};

/// Spawns a one-shot HTTP server answering a single request with `body`,
/// and returns its base URL.
#[allow(dead_code)]
pub fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let addr = listener.local_addr().expect("server address");

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let header = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(body);
        }
    });

    format!("http://{}", addr)
}

/// Everything a scripted transport observed, shared with the test body.
#[derive(Default)]
pub struct TransportLog {
    pub opens: usize,
    pub settings: Vec<TransportSetting>,
    pub fetched: Vec<String>,
}

/// A transport double that records every applied setting and serves a
/// scripted fetch response.
pub struct ScriptedTransport {
    log: Arc<Mutex<TransportLog>>,
    response: Result<Vec<u8>, String>,
}

impl TransportHandle for ScriptedTransport {
    fn set(&mut self, setting: TransportSetting) -> Result<(), SettingError> {
        self.log.lock().unwrap().settings.push(setting);
        Ok(())
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    fn fetch(&mut self, url: &Url, sink: &mut RecvBuffer) -> Result<(), FetchFailure> {
        self.log.lock().unwrap().fetched.push(url.to_string());
        match &self.response {
            Ok(bytes) => {
                sink.extend_from_slice(bytes);
                Ok(())
            }
            Err(message) => Err(FetchFailure::new(message.clone(), false)),
        }
    }

    fn last_error(&self) -> Option<&str> {
        None
    }
}

/// Factory handing out [`ScriptedTransport`] handles that share one log.
pub struct ScriptedTransportFactory {
    pub log: Arc<Mutex<TransportLog>>,
    response: Result<Vec<u8>, String>,
}

impl ScriptedTransportFactory {
    pub fn responding(body: &[u8]) -> Self {
        Self {
            log: Arc::default(),
            response: Ok(body.to_vec()),
        }
    }

    #[allow(dead_code)]
    pub fn failing(message: &str) -> Self {
        Self {
            log: Arc::default(),
            response: Err(message.to_string()),
        }
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    /// Opens one handle directly, for tests that drive the apply pipeline
    /// without a session.
    #[allow(dead_code)]
    pub fn open_handle(&self) -> Box<dyn TransportHandle> {
        self.open().expect("scripted open never fails")
    }

    #[allow(dead_code)]
    pub fn settings(&self) -> Vec<TransportSetting> {
        self.log.lock().unwrap().settings.clone()
    }

    #[allow(dead_code)]
    pub fn fetched(&self) -> Vec<String> {
        self.log.lock().unwrap().fetched.clone()
    }
}

impl TransportFactory for ScriptedTransportFactory {
    fn open(&self) -> Result<Box<dyn TransportHandle>, Dap4Error> {
        self.log.lock().unwrap().opens += 1;
        Ok(Box::new(ScriptedTransport {
            log: Arc::clone(&self.log),
            response: self.response.clone(),
        }))
    }
}

/// A parser double that always rejects its input.
#[allow(dead_code)]
pub struct RejectingParser;

impl ManifestParser for RejectingParser {
    fn parse(&self, _raw: Vec<u8>) -> Result<ManifestDocument, ManifestError> {
        Err(ManifestError::new("scripted parse failure"))
    }
}

/// A substrate factory whose stores always stop with a too-large variable.
#[allow(dead_code)]
pub struct OversizeSubstrateFactory;

impl SubstrateFactory for OversizeSubstrateFactory {
    fn create(
        &self,
        _name: &str,
        _mode: SubstrateMode,
        _no_fill: bool,
    ) -> Result<Box<dyn SubstrateStore>, SubstrateError> {
        Ok(Box::new(OversizeSubstrate))
    }
}

#[allow(dead_code)]
struct OversizeSubstrate;

impl SubstrateStore for OversizeSubstrate {
    fn build(&mut self, _manifest: &ManifestDocument) -> Result<(), SubstrateError> {
        Err(SubstrateError::VariableTooLarge(
            "variable v exceeds the build limit".to_string(),
        ))
    }

    fn persist(&mut self) -> Result<(), SubstrateError> {
        Ok(())
    }

    fn abort(&mut self) -> Result<(), SubstrateError> {
        Ok(())
    }

    fn path(&self) -> Option<&std::path::Path> {
        None
    }

    fn file_backed(&self) -> bool {
        false
    }
}
