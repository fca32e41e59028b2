// ── Tunnel lifecycle ──
//
// One SSH local forward per tunneled target. The processes are external and
// can die or be replaced behind our back, so every operation re-reads the
// live state from the probe; the in-memory table is bookkeeping only.
//
// Invariant: at most one Active tunnel per local port. All mutations of a
// port go through that port's async mutex.

pub mod signature;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ncsync_api::CommandRunner;

use crate::error::CoreError;
use crate::model::{Intermediary, Target, Tunnel, TunnelState};
use crate::probe::{ProcessHandle, ProcessProbe};
use signature::ForwardSpec;

/// Tuning for tunnel creation and teardown.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// SSH client executable.
    pub ssh_program: String,
    /// Bound on the `ssh -f` invocation itself (it returns once forwarding
    /// is set up and the process has backgrounded).
    pub spawn_timeout: Duration,
    /// Overall deadline for the local port to become connectable.
    pub deadline: Duration,
    /// First delay between connectability polls; doubles up to `max_poll`.
    pub poll_interval: Duration,
    pub max_poll: Duration,
    /// Connect timeout for one health check.
    pub health_timeout: Duration,
    /// How long a process gets to exit before it is force-killed.
    pub grace: Duration,
    /// Spawn attempts before giving up.
    pub max_attempts: u32,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".into(),
            spawn_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            max_poll: Duration::from_secs(2),
            health_timeout: Duration::from_secs(1),
            grace: Duration::from_secs(3),
            max_attempts: 2,
        }
    }
}

/// Creates, verifies, replaces, and tears down tunnels.
pub struct TunnelManager<P, R> {
    probe: Arc<P>,
    runner: Arc<R>,
    settings: TunnelSettings,
    locks: DashMap<u16, Arc<Mutex<()>>>,
    tunnels: DashMap<u16, Tunnel>,
}

impl<P: ProcessProbe, R: CommandRunner> TunnelManager<P, R> {
    pub fn new(probe: Arc<P>, runner: Arc<R>, settings: TunnelSettings) -> Self {
        Self {
            probe,
            runner,
            settings,
            locks: DashMap::new(),
            tunnels: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &TunnelSettings {
        &self.settings
    }

    fn port_lock(&self, port: u16) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(port).or_default().value())
    }

    fn set_state(&self, target: &Target, pid: Option<u32>, state: TunnelState) -> Tunnel {
        let tunnel = Tunnel::new(target, pid, state);
        self.tunnels.insert(target.local_port, tunnel.clone());
        tunnel
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Make the target's management API reachable.
    ///
    /// Direct targets return immediately. For tunneled targets a healthy
    /// tunnel carrying the right forward is reused; anything else on the
    /// port is terminated and a fresh tunnel is spawned.
    pub async fn ensure_connected(&self, target: &Target) -> Result<Tunnel, CoreError> {
        if target.is_direct() {
            return Ok(Tunnel::direct(target));
        }
        let hop = target.intermediary.as_ref().ok_or_else(|| CoreError::Config {
            message: format!("target '{}' is tunneled but has no intermediary host", target.id),
        })?;

        let spec = target.forward_spec();
        let port = spec.local_port;
        let lock = self.port_lock(port);
        let _guard = lock.lock().await;

        match self.probe.find_listener(port).await {
            Some(listener) if signature::matches(&listener.argv, &spec) => {
                if self
                    .probe
                    .port_accepts(port, self.settings.health_timeout)
                    .await
                {
                    debug!(
                        target = %target.id,
                        port,
                        pid = listener.pid,
                        "reusing existing tunnel"
                    );
                    let created_at = self.tunnels.get(&port).map(|t| t.created_at);
                    let mut tunnel =
                        self.set_state(target, Some(listener.pid), TunnelState::Active);
                    if let Some(created_at) = created_at {
                        tunnel.created_at = created_at;
                        self.tunnels.insert(port, tunnel.clone());
                    }
                    return Ok(tunnel);
                }
                warn!(
                    target = %target.id,
                    port,
                    pid = listener.pid,
                    "tunnel process is not accepting connections"
                );
                self.retire(target, &listener).await;
            }
            Some(listener) => {
                if signature::forwards_port(&listener.argv, port) {
                    warn!(
                        target = %target.id,
                        port,
                        pid = listener.pid,
                        command = %listener.command_line(),
                        "port held by a tunnel to a different remote"
                    );
                } else {
                    warn!(
                        target = %target.id,
                        port,
                        pid = listener.pid,
                        command = %listener.command_line(),
                        "port held by a foreign process"
                    );
                }
                self.retire(target, &listener).await;
            }
            None => {}
        }

        self.reap_strays(&spec).await;

        let mut last_error = String::from("no attempt made");
        for attempt in 1..=self.settings.max_attempts.max(1) {
            self.set_state(target, None, TunnelState::Connecting);
            info!(
                target = %target.id,
                port,
                attempt,
                forward = %spec,
                via = %hop.host,
                "opening tunnel"
            );

            match self.spawn_and_wait(hop, &spec).await {
                Ok(()) => {
                    let pid = self.probe.find_listener(port).await.map(|h| h.pid);
                    let tunnel = self.set_state(target, pid, TunnelState::Active);
                    info!(target = %target.id, port, pid = ?pid, "tunnel active");
                    return Ok(tunnel);
                }
                Err(reason) => {
                    warn!(target = %target.id, port, attempt, %reason, "tunnel attempt failed");
                    last_error = reason;
                    self.reap_strays(&spec).await;
                }
            }
        }

        self.tunnels.remove(&port);
        Err(CoreError::Connectivity {
            target: target.id.clone(),
            reason: last_error,
        })
    }

    async fn spawn_and_wait(&self, hop: &Intermediary, spec: &ForwardSpec) -> Result<(), String> {
        let argv = ssh_argv(&self.settings.ssh_program, hop, spec);
        debug!(?argv, "spawning tunnel");

        let output = self
            .runner
            .run(&argv, self.settings.spawn_timeout)
            .await
            .map_err(|e| format!("could not run {}: {e}", self.settings.ssh_program))?;
        if !output.success() {
            let code = output
                .code
                .map_or_else(|| "signal".to_owned(), |c| c.to_string());
            return Err(format!("ssh exited with {code}: {}", output.stderr));
        }

        self.wait_connectable(spec.local_port).await
    }

    /// Poll the local port with exponential backoff until it accepts
    /// connections or the deadline passes.
    async fn wait_connectable(&self, port: u16) -> Result<(), String> {
        let deadline = Instant::now() + self.settings.deadline;
        let mut delay = self.settings.poll_interval;
        loop {
            if self
                .probe
                .port_accepts(port, self.settings.health_timeout)
                .await
            {
                return Ok(());
            }
            if Instant::now() + delay > deadline {
                return Err(format!(
                    "port {port} not accepting connections after {}s",
                    self.settings.deadline.as_secs()
                ));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.settings.max_poll);
        }
    }

    /// Stale → Terminating → Absent for whatever holds the port.
    async fn retire(&self, target: &Target, listener: &ProcessHandle) {
        self.set_state(target, Some(listener.pid), TunnelState::Stale);
        self.set_state(target, Some(listener.pid), TunnelState::Terminating);
        self.probe.terminate(listener, self.settings.grace).await;
        self.tunnels.remove(&target.local_port);
    }

    /// Terminate signature-matching processes that do not hold the port,
    /// e.g. a previous run's tunnel still starting up or wedged.
    async fn reap_strays(&self, spec: &ForwardSpec) {
        let strays = self
            .probe
            .list_processes_matching(&|argv| signature::matches(argv, spec))
            .await;
        for stray in strays {
            info!(pid = stray.pid, forward = %spec, "terminating stray tunnel process");
            self.probe.terminate(&stray, self.settings.grace).await;
        }
    }

    // ── Disconnect ───────────────────────────────────────────────────

    /// Tear down the target's tunnel. Returns whether any process was
    /// terminated. Foreign processes on the port are left alone.
    pub async fn disconnect(&self, target: &Target) -> bool {
        if target.is_direct() {
            return false;
        }
        let spec = target.forward_spec();
        let lock = self.port_lock(spec.local_port);
        let _guard = lock.lock().await;

        let mut victims = self
            .probe
            .list_processes_matching(&|argv| signature::matches(argv, &spec))
            .await;
        if let Some(listener) = self.probe.find_listener(spec.local_port).await {
            if signature::matches(&listener.argv, &spec)
                && !victims.iter().any(|v| v.pid == listener.pid)
            {
                victims.push(listener);
            }
        }

        if !victims.is_empty() {
            self.set_state(target, victims.first().map(|v| v.pid), TunnelState::Terminating);
        }
        for victim in &victims {
            info!(target = %target.id, pid = victim.pid, "closing tunnel");
            self.probe.terminate(victim, self.settings.grace).await;
        }
        self.tunnels.remove(&spec.local_port);
        !victims.is_empty()
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Current state, recomputed from the live process table.
    pub async fn status(&self, target: &Target) -> TunnelState {
        if target.is_direct() {
            return TunnelState::Active;
        }
        let spec = target.forward_spec();
        match self.probe.find_listener(spec.local_port).await {
            Some(listener) if signature::matches(&listener.argv, &spec) => {
                if self
                    .probe
                    .port_accepts(spec.local_port, self.settings.health_timeout)
                    .await
                {
                    TunnelState::Active
                } else {
                    TunnelState::Stale
                }
            }
            Some(_) => TunnelState::Stale,
            None => self
                .tunnels
                .get(&spec.local_port)
                .map(|t| t.state)
                .filter(|s| s.is_transitional())
                .unwrap_or(TunnelState::Absent),
        }
    }

    /// Tracked tunnels whose process is still alive, sorted by port.
    pub async fn tunnels(&self) -> Vec<Tunnel> {
        let tracked: Vec<Tunnel> = self.tunnels.iter().map(|t| t.value().clone()).collect();
        let mut tunnels = Vec::with_capacity(tracked.len());
        for tunnel in tracked {
            let alive = match tunnel.pid {
                _ if tunnel.state.is_transitional() => true,
                Some(pid) => self.probe.is_alive(pid).await,
                None => false,
            };
            if alive {
                tunnels.push(tunnel);
            } else {
                self.tunnels.remove_if(&tunnel.local_port, |_, t| t.pid == tunnel.pid);
            }
        }
        tunnels.sort_by_key(|t| t.local_port);
        tunnels
    }
}

/// `ssh -f -N` with a single local forward, never prompting.
pub fn ssh_argv(program: &str, hop: &Intermediary, spec: &ForwardSpec) -> Vec<String> {
    let mut argv: Vec<String> = vec![
        program.into(),
        "-f".into(),
        "-N".into(),
        "-o".into(),
        "BatchMode=yes".into(),
        "-o".into(),
        "ExitOnForwardFailure=yes".into(),
        "-o".into(),
        "ServerAliveInterval=30".into(),
        "-L".into(),
        spec.to_string(),
    ];
    if let Some(port) = hop.port {
        argv.push("-p".into());
        argv.push(port.to_string());
    }
    argv.push(hop.host.clone());
    argv
}
