// Shared in-memory fakes for the process table and external commands.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;

use ncsync_api::{CommandRunner, ProcessOutput};
use ncsync_core::tunnel::signature;
use ncsync_core::{
    Credentials, Engine, EngineConfig, Intermediary, ProcessHandle, ProcessProbe,
    ReachabilityMode, Target, TunnelSettings,
};

type Responder = Box<dyn Fn(&str) -> ProcessOutput + Send + Sync>;

/// A pretend OS: processes, listening ports, and canned curl answers.
pub struct World {
    processes: Mutex<HashMap<u32, ProcessHandle>>,
    listeners: Mutex<HashMap<u16, u32>>,
    unhealthy: Mutex<HashSet<u32>>,
    next_pid: AtomicU32,
    pub ssh_spawns: AtomicUsize,
    pub terminated: Mutex<Vec<u32>>,
    /// Exit status for the next ssh invocations; `None` means succeed.
    pub ssh_failure: Mutex<Option<ProcessOutput>>,
    /// When false, ssh starts but never binds its port.
    pub ssh_binds: Mutex<bool>,
    curl: Mutex<Option<Responder>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub curl_calls: AtomicUsize,
    curl_delay: Mutex<Duration>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            processes: Mutex::default(),
            listeners: Mutex::default(),
            unhealthy: Mutex::default(),
            next_pid: AtomicU32::new(1000),
            ssh_spawns: AtomicUsize::new(0),
            terminated: Mutex::default(),
            ssh_failure: Mutex::new(None),
            ssh_binds: Mutex::new(true),
            curl: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            curl_calls: AtomicUsize::new(0),
            curl_delay: Mutex::new(Duration::from_millis(5)),
        })
    }

    /// Start a process; if `port` is given it listens there.
    pub fn start(&self, argv: &[&str], port: Option<u16>) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let argv: Vec<String> = argv.iter().map(|s| (*s).to_string()).collect();
        let name = argv.first().cloned().unwrap_or_default();
        self.processes
            .lock()
            .unwrap()
            .insert(pid, ProcessHandle { pid, name, argv });
        if let Some(port) = port {
            self.listeners.lock().unwrap().insert(port, pid);
        }
        pid
    }

    pub fn kill_externally(&self, pid: u32) {
        self.processes.lock().unwrap().remove(&pid);
        self.listeners.lock().unwrap().retain(|_, p| *p != pid);
    }

    /// The process keeps its port bound but stops accepting connections.
    pub fn mark_unhealthy(&self, pid: u32) {
        self.unhealthy.lock().unwrap().insert(pid);
    }

    pub fn listener(&self, port: u16) -> Option<ProcessHandle> {
        let pid = *self.listeners.lock().unwrap().get(&port)?;
        self.processes.lock().unwrap().get(&pid).cloned()
    }

    pub fn live_ssh_count(&self) -> usize {
        self.processes
            .lock()
            .unwrap()
            .values()
            .filter(|p| signature::is_ssh(&p.argv))
            .count()
    }

    pub fn respond_with(&self, f: impl Fn(&str) -> ProcessOutput + Send + Sync + 'static) {
        *self.curl.lock().unwrap() = Some(Box::new(f));
    }

    pub fn set_curl_delay(&self, delay: Duration) {
        *self.curl_delay.lock().unwrap() = delay;
    }

    fn spawn_ssh(&self, argv: &[String]) -> ProcessOutput {
        self.ssh_spawns.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.ssh_failure.lock().unwrap().clone() {
            return failure;
        }
        let forward = signature::local_forwards(argv).into_iter().next().unwrap();
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let binds = *self.ssh_binds.lock().unwrap();
        self.start(&refs, binds.then_some(forward.local_port));
        ProcessOutput::new(Some(0), "", "")
    }
}

// ── Probe ───────────────────────────────────────────────────────────

pub struct FakeProbe(pub Arc<World>);

impl ProcessProbe for FakeProbe {
    async fn find_listener(&self, port: u16) -> Option<ProcessHandle> {
        self.0.listener(port)
    }

    async fn list_processes_matching(
        &self,
        predicate: &(dyn Fn(&[String]) -> bool + Sync),
    ) -> Vec<ProcessHandle> {
        let mut found: Vec<ProcessHandle> = self
            .0
            .processes
            .lock()
            .unwrap()
            .values()
            .filter(|p| predicate(&p.argv))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.pid);
        found
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.0.processes.lock().unwrap().contains_key(&pid)
    }

    async fn port_accepts(&self, port: u16, _timeout: Duration) -> bool {
        tokio::task::yield_now().await;
        let pid = self.0.listeners.lock().unwrap().get(&port).copied();
        pid.is_some_and(|pid| !self.0.unhealthy.lock().unwrap().contains(&pid))
    }

    async fn terminate(&self, handle: &ProcessHandle, _grace: Duration) {
        tokio::task::yield_now().await;
        if self.0.processes.lock().unwrap().contains_key(&handle.pid) {
            self.0.terminated.lock().unwrap().push(handle.pid);
        }
        self.0.kill_externally(handle.pid);
    }
}

// ── Runner ──────────────────────────────────────────────────────────

pub struct FakeRunner(pub Arc<World>);

impl CommandRunner for FakeRunner {
    async fn run(&self, argv: &[String], _timeout: Duration) -> io::Result<ProcessOutput> {
        let program = argv.first().map(String::as_str).unwrap_or_default();
        match program {
            "ssh" => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(self.0.spawn_ssh(argv))
            }
            "curl" => {
                self.0.curl_calls.fetch_add(1, Ordering::SeqCst);
                let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.0.max_in_flight.fetch_max(now, Ordering::SeqCst);
                let delay = *self.0.curl_delay.lock().unwrap();
                tokio::time::sleep(delay).await;
                self.0.in_flight.fetch_sub(1, Ordering::SeqCst);

                let url = argv.last().cloned().unwrap_or_default();
                let guard = self.0.curl.lock().unwrap();
                let responder = guard.as_ref().expect("no curl responder installed");
                Ok(responder(&url))
            }
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{other}: not found"),
            )),
        }
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub type TestEngine = Engine<FakeProbe, FakeRunner>;

pub fn engine(world: &Arc<World>) -> TestEngine {
    let config = EngineConfig {
        tunnel: TunnelSettings {
            deadline: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            max_poll: Duration::from_millis(50),
            grace: Duration::from_millis(10),
            ..TunnelSettings::default()
        },
        ..EngineConfig::default()
    };
    Engine::new(
        config,
        Arc::new(FakeProbe(Arc::clone(world))),
        Arc::new(FakeRunner(Arc::clone(world))),
    )
}

pub fn tunneled_target() -> Target {
    Target {
        id: "titan-e2e".into(),
        name: "Titan E2E".into(),
        description: None,
        environment: Some("e2e".into()),
        platform: Some("titan".into()),
        remote_host: "198.51.100.5".into(),
        remote_port: 8888,
        intermediary: Some(Intermediary {
            host: "devm".into(),
            port: None,
        }),
        https: true,
        local_port: 8888,
        credentials: Credentials {
            username: "admin".into(),
            password: SecretString::from("admin".to_string()),
        },
        reachability: ReachabilityMode::Tunneled,
    }
}

pub fn direct_target() -> Target {
    Target {
        id: "titan-dev".into(),
        reachability: ReachabilityMode::Direct,
        ..tunneled_target()
    }
}

// ── Canned responses ────────────────────────────────────────────────

pub fn inventory(names: &[&str]) -> ProcessOutput {
    let mut body = String::from(r#"<devices xmlns="http://tail-f.com/ns/ncs">"#);
    for name in names {
        body.push_str(&format!("<device><name>{name}</name></device>"));
    }
    body.push_str("</devices>");
    // The API keeps the connection open, so curl times out after the body.
    ProcessOutput::new(Some(28), body, "curl: (28) Operation timed out")
}

pub fn sync_marker(result: &str) -> ProcessOutput {
    ProcessOutput::new(
        Some(0),
        format!(r#"<output xmlns="http://tail-f.com/ns/ncs"><result>{result}</result></output>"#),
        "",
    )
}

pub fn empty_timeout() -> ProcessOutput {
    ProcessOutput::new(Some(28), "", "curl: (28) Operation timed out after 10000 ms")
}

/// Device name from a check-sync URL, if it is one.
pub fn device_of(url: &str) -> Option<&str> {
    url.split("device=").nth(1)?.strip_suffix("/check-sync")
}
