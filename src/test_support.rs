//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use zip::write::SimpleFileOptions;

use crate::error::{AgentError, Result};
use crate::matcher::{Matcher, Rule, RuleCompiler};
use crate::scan::process::{ProcessInfo, ProcessTable};

/// Matches when a buffer contains a needle; process results are canned.
///
/// Records every target it is asked about: `bytes`, `file:<path>`, `pid:<n>`.
#[derive(Clone, Default)]
pub struct NeedleMatcher {
    needles: Vec<(String, Vec<u8>)>,
    processes: HashMap<u32, Vec<String>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl NeedleMatcher {
    pub fn new(needles: &[(&str, &str)]) -> Self {
        Self {
            needles: needles
                .iter()
                .map(|(rule, needle)| (rule.to_string(), needle.as_bytes().to_vec()))
                .collect(),
            ..Self::default()
        }
    }

    /// Canned result for `pid`. Pids without one behave as exited.
    pub fn with_process_match(mut self, pid: u32, rules: &[&str]) -> Self {
        self.processes
            .insert(pid, rules.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn record(&self, what: String) {
        self.seen.lock().unwrap().push(what);
    }

    fn hits(&self, data: &[u8]) -> Vec<String> {
        self.needles
            .iter()
            .filter(|(_, needle)| data.windows(needle.len()).any(|w| w == needle.as_slice()))
            .map(|(rule, _)| rule.clone())
            .collect()
    }
}

impl Matcher for NeedleMatcher {
    fn match_bytes(&self, data: &[u8]) -> Result<Vec<String>> {
        self.record("bytes".into());
        Ok(self.hits(data))
    }

    fn match_file(&self, path: &Path) -> Result<Vec<String>> {
        self.record(format!("file:{}", path.display()));
        let data = std::fs::read(path)?;
        Ok(self.hits(&data))
    }

    fn match_process(&self, pid: u32) -> Result<Vec<String>> {
        self.record(format!("pid:{}", pid));
        self.processes
            .get(&pid)
            .cloned()
            .ok_or(AgentError::ProcessGone(pid))
    }
}

/// Hands out clones of a prepared [`NeedleMatcher`], whatever the rule text.
pub struct NeedleCompiler(pub NeedleMatcher);

impl RuleCompiler for NeedleCompiler {
    fn compile(&self, _rule: &Rule) -> Result<Box<dyn Matcher>> {
        Ok(Box::new(self.0.clone()))
    }
}

#[derive(Default)]
pub struct FakeProcessTable {
    processes: Vec<ProcessInfo>,
    vanished: Vec<u32>,
    fail_snapshot: bool,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, pid: u32, name: &str, path: &str) -> Self {
        self.processes.push(ProcessInfo {
            pid,
            name: Some(name.into()),
            path: Some(path.into()),
            command_line: Some(format!("{} --flag", path)),
        });
        self
    }

    /// Listed in the snapshot but gone by inspection time.
    pub fn with_vanished(mut self, pid: u32) -> Self {
        self.vanished.push(pid);
        self
    }

    pub fn failing_snapshot(mut self) -> Self {
        self.fail_snapshot = true;
        self
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Result<Vec<u32>> {
        if self.fail_snapshot {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no /proc").into());
        }
        let mut pids: Vec<u32> = self
            .processes
            .iter()
            .map(|p| p.pid)
            .chain(self.vanished.iter().copied())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn inspect(&self, pid: u32) -> Result<ProcessInfo> {
        self.processes
            .iter()
            .find(|p| p.pid == pid)
            .cloned()
            .ok_or(AgentError::ProcessGone(pid))
    }
}

/// Write a zip archive holding `entries`.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// One request received by [`MockRuleServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub form: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self, key: &str) -> Vec<&str> {
        self.form
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Loopback stand-in for the rule server.
///
/// `/getrule` answers with the stored rule text or an empty body; every
/// other path answers `OK`. Paths given a fixed status answer that status
/// with an empty body. All requests are recorded.
pub struct MockRuleServer {
    addr: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockRuleServer {
    pub fn start(rules: &[(&str, &str)]) -> Self {
        Self::start_with_status(rules, &[])
    }

    /// Like [`MockRuleServer::start`], with `statuses` answering per path.
    pub fn start_with_status(rules: &[(&str, &str)], statuses: &[(&str, u16)]) -> Self {
        let statuses: HashMap<String, u16> = statuses
            .iter()
            .map(|(path, status)| (path.to_string(), *status))
            .collect();
        let rules: HashMap<String, String> = rules
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let addr = listener.local_addr().unwrap().to_string();
        listener
            .set_nonblocking(true)
            .expect("Cannot set non-blocking");

        let recorded = Arc::clone(&requests);
        let stop = Arc::clone(&shutdown);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        handle(stream, &rules, &statuses, &recorded);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            requests,
            shutdown,
        }
    }

    /// `host:port` of the server.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

impl Drop for MockRuleServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn handle(
    mut stream: TcpStream,
    rules: &HashMap<String, String>,
    statuses: &HashMap<String, u16>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).is_err() || header == "\r\n" || header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }
    let form: Vec<(String, String)> = url::form_urlencoded::parse(&body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let status = statuses.get(&path).copied().unwrap_or(200);
    let reply = if status != 200 {
        String::new()
    } else if path == "/getrule" {
        form.iter()
            .find(|(k, _)| k == "rulename")
            .and_then(|(_, name)| rules.get(name))
            .cloned()
            .unwrap_or_default()
    } else {
        "OK".to_string()
    };

    recorded.lock().unwrap().push(RecordedRequest { path, form });

    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        reason(status),
        reply.len(),
        reply
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// An address nothing listens on.
pub fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
