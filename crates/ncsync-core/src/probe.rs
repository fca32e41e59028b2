// ── Process probe ──
//
// Cross-platform process and socket inspection used by the tunnel manager.
// Every failure degrades to "not found": the manager re-verifies and retries
// rather than aborting on a permission error or a vanished process.

use std::ffi::OsStr;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use netstat2::{
    AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, TcpState, get_sockets_info,
};
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System,
    UpdateKind,
};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Interval between liveness checks while waiting for a process to exit.
const EXIT_POLL: Duration = Duration::from_millis(100);

/// A live process as seen by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Executable name; empty if it could not be read.
    pub name: String,
    /// Full argument vector, `argv[0]` included; empty if it could not be read.
    pub argv: Vec<String>,
}

impl ProcessHandle {
    pub fn command_line(&self) -> String {
        if self.argv.is_empty() {
            self.name.clone()
        } else {
            self.argv.join(" ")
        }
    }
}

/// OS inspection primitives the tunnel manager is built on.
pub trait ProcessProbe: Send + Sync {
    /// The process holding a TCP socket in LISTEN state on `port`.
    fn find_listener(&self, port: u16) -> impl Future<Output = Option<ProcessHandle>> + Send;

    /// All processes whose argv satisfies `predicate`, sorted by pid.
    fn list_processes_matching(
        &self,
        predicate: &(dyn Fn(&[String]) -> bool + Sync),
    ) -> impl Future<Output = Vec<ProcessHandle>> + Send;

    fn is_alive(&self, pid: u32) -> impl Future<Output = bool> + Send;

    /// Whether a TCP connect to `127.0.0.1:port` succeeds within `timeout`.
    fn port_accepts(&self, port: u16, timeout: Duration) -> impl Future<Output = bool> + Send;

    /// Ask the process to exit, wait up to `grace`, then force-kill.
    /// Terminating a process that is already gone is not an error.
    fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> impl Future<Output = ()> + Send;
}

/// [`ProcessProbe`] backed by the OS socket table (`netstat2`) and process
/// list (`sysinfo`). Table scans run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    async fn find_listener(&self, port: u16) -> Option<ProcessHandle> {
        offload(move || listener_on(port)).await.flatten()
    }

    async fn list_processes_matching(
        &self,
        predicate: &(dyn Fn(&[String]) -> bool + Sync),
    ) -> Vec<ProcessHandle> {
        offload(live_processes)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|h| predicate(&h.argv))
            .collect()
    }

    async fn is_alive(&self, pid: u32) -> bool {
        offload(move || alive(pid)).await.unwrap_or(false)
    }

    async fn port_accepts(&self, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((Ipv4Addr::LOCALHOST, port))).await,
            Ok(Ok(_))
        )
    }

    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) {
        let pid = handle.pid;
        if !self.is_alive(pid).await {
            debug!(pid, "process already gone");
            return;
        }

        if !offload(move || signal(pid, false)).await.unwrap_or(false) {
            warn!(pid, "could not signal process");
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive(pid).await {
                info!(pid, "process exited");
                return;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }

        if self.is_alive(pid).await {
            warn!(pid, grace_ms = grace.as_millis(), "process ignored termination, killing");
            if !offload(move || signal(pid, true)).await.unwrap_or(false) {
                warn!(pid, "force kill failed");
            }
        }
    }
}

/// Run a socket or process table scan off the async workers.
async fn offload<T, F>(scan: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(scan).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "process probe task failed");
            None
        }
    }
}

fn listener_on(port: u16) -> Option<ProcessHandle> {
    let sockets = match get_sockets_info(
        AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
        ProtocolFlags::TCP,
    ) {
        Ok(sockets) => sockets,
        Err(e) => {
            warn!(port, error = %e, "cannot read socket table");
            return None;
        }
    };

    let mut unattributed = false;
    let pid = sockets.iter().find_map(|si| match &si.protocol_socket_info {
        ProtocolSocketInfo::Tcp(tcp) if tcp.local_port == port && tcp.state == TcpState::Listen => {
            let pid = si.associated_pids.first().copied();
            unattributed |= pid.is_none();
            pid
        }
        _ => None,
    });

    let Some(pid) = pid else {
        if unattributed {
            debug!(port, "port is bound by a process we cannot inspect");
        }
        return None;
    };

    Some(describe(pid).unwrap_or_else(|| {
        debug!(port, pid, "listener exited or is not readable");
        ProcessHandle {
            pid,
            name: String::new(),
            argv: Vec::new(),
        }
    }))
}

fn describe(pid: u32) -> Option<ProcessHandle> {
    let sys = snapshot(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]));
    sys.process(Pid::from_u32(pid)).map(|p| handle(pid, p))
}

fn live_processes() -> Vec<ProcessHandle> {
    let sys = snapshot(ProcessesToUpdate::All);
    let mut found: Vec<ProcessHandle> = sys
        .processes()
        .iter()
        .filter(|(_, p)| p.status() != ProcessStatus::Zombie)
        .map(|(pid, p)| handle(pid.as_u32(), p))
        .collect();
    found.sort_by_key(|h| h.pid);
    found
}

fn alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    snapshot(ProcessesToUpdate::Some(&[pid]))
        .process(pid)
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}

fn snapshot(which: ProcessesToUpdate<'_>) -> System {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        which,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );
    sys
}

fn handle(pid: u32, process: &Process) -> ProcessHandle {
    ProcessHandle {
        pid,
        name: AsRef::<OsStr>::as_ref(process.name()).to_string_lossy().into_owned(),
        argv: process
            .cmd()
            .iter()
            .map(|arg| AsRef::<OsStr>::as_ref(arg).to_string_lossy().into_owned())
            .collect(),
    }
}

/// Send SIGTERM (or the platform's closest equivalent), or SIGKILL when
/// `force` is set. Returns whether a signal was delivered.
fn signal(pid: u32, force: bool) -> bool {
    let pid = Pid::from_u32(pid);
    let sys = snapshot(ProcessesToUpdate::Some(&[pid]));
    let Some(process) = sys.process(pid) else {
        return false;
    };
    if force {
        process.kill()
    } else {
        process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_falls_back_to_name() {
        let h = ProcessHandle {
            pid: 42,
            name: "ssh".into(),
            argv: Vec::new(),
        };
        assert_eq!(h.command_line(), "ssh");
    }

    #[tokio::test]
    async fn own_process_is_alive() {
        assert!(SystemProbe.is_alive(std::process::id()).await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn scans_leave_the_runtime_thread_free() {
        // On a single-threaded runtime a blocking scan would starve the ticker.
        let ticks = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            }
        });

        let found = SystemProbe
            .list_processes_matching(&|argv: &[String]| !argv.is_empty())
            .await;
        ticker.abort();

        assert!(found.windows(2).all(|w| w[0].pid < w[1].pid));
        assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn terminating_a_dead_pid_is_a_no_op() {
        // PIDs near u32::MAX are never allocated on supported platforms.
        let ghost = ProcessHandle {
            pid: u32::MAX - 7,
            name: String::new(),
            argv: Vec::new(),
        };
        SystemProbe.terminate(&ghost, Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn bound_listener_accepts() {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        assert!(SystemProbe.port_accepts(port, Duration::from_secs(1)).await);
        drop(listener);
    }
}
