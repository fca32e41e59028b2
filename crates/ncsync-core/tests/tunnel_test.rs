#![allow(clippy::unwrap_used)]
// Tunnel lifecycle tests against an in-memory process table.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use ncsync_api::ProcessOutput;
use ncsync_core::tunnel::signature;
use ncsync_core::{CoreError, TunnelState};

use common::{World, direct_target, engine, tunneled_target};

#[tokio::test]
async fn direct_targets_never_spawn() {
    let world = World::new();
    let engine = engine(&world);
    let target = direct_target();

    let tunnel = engine.ensure_connected(&target).await.unwrap();
    assert_eq!(tunnel.state, TunnelState::Active);
    assert_eq!(tunnel.pid, None);
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Active);
    assert!(!engine.disconnect(&target).await);
    assert_eq!(world.ssh_spawns.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fresh_port_gets_a_tunnel() {
    let world = World::new();
    let engine = engine(&world);
    let target = tunneled_target();
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Absent);

    let tunnel = engine.ensure_connected(&target).await.unwrap();

    assert_eq!(tunnel.state, TunnelState::Active);
    assert_eq!(tunnel.local_port, 8888);
    let listener = world.listener(8888).unwrap();
    assert_eq!(tunnel.pid, Some(listener.pid));
    assert!(signature::matches(&listener.argv, &target.forward_spec()));
    assert!(listener.argv.contains(&"ExitOnForwardFailure=yes".to_string()));
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Active);
}

#[tokio::test]
async fn reconnecting_reuses_the_live_tunnel() {
    let world = World::new();
    let engine = engine(&world);
    let target = tunneled_target();

    let first = engine.ensure_connected(&target).await.unwrap();
    let second = engine.ensure_connected(&target).await.unwrap();

    assert_eq!(world.ssh_spawns.load(Ordering::SeqCst), 1);
    assert_eq!(world.live_ssh_count(), 1);
    assert_eq!(first.pid, second.pid);
    assert_eq!(first.created_at, second.created_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_spawn_once() {
    let world = World::new();
    let engine = engine(&world);
    let target = Arc::new(tunneled_target());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let target = Arc::clone(&target);
            tokio::spawn(async move { engine.ensure_connected(&target).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_active());
    }

    assert_eq!(world.ssh_spawns.load(Ordering::SeqCst), 1);
    assert_eq!(world.live_ssh_count(), 1);
}

#[tokio::test]
async fn foreign_occupant_is_replaced() {
    let world = World::new();
    let squatter = world.start(&["python3", "-m", "http.server", "8888"], Some(8888));
    let engine = engine(&world);
    let target = tunneled_target();
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Stale);

    let tunnel = engine.ensure_connected(&target).await.unwrap();

    assert!(world.terminated.lock().unwrap().contains(&squatter));
    let listener = world.listener(8888).unwrap();
    assert_ne!(listener.pid, squatter);
    assert_eq!(tunnel.pid, Some(listener.pid));
    assert!(signature::matches(&listener.argv, &target.forward_spec()));
}

#[tokio::test]
async fn tunnel_to_another_remote_is_replaced() {
    let world = World::new();
    let orphan = world.start(
        &["ssh", "-f", "-N", "-L", "8888:198.51.100.77:8888", "devm"],
        Some(8888),
    );
    let engine = engine(&world);
    let target = tunneled_target();

    engine.ensure_connected(&target).await.unwrap();

    assert!(world.terminated.lock().unwrap().contains(&orphan));
    assert_eq!(world.ssh_spawns.load(Ordering::SeqCst), 1);
    assert_eq!(world.live_ssh_count(), 1);
}

#[tokio::test]
async fn unhealthy_matching_tunnel_is_replaced() {
    let world = World::new();
    let wedged = world.start(
        &["ssh", "-f", "-N", "-L", "8888:198.51.100.5:8888", "devm"],
        Some(8888),
    );
    world.mark_unhealthy(wedged);
    let engine = engine(&world);
    let target = tunneled_target();
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Stale);

    let tunnel = engine.ensure_connected(&target).await.unwrap();

    assert!(world.terminated.lock().unwrap().contains(&wedged));
    assert_ne!(tunnel.pid, Some(wedged));
    assert_eq!(world.live_ssh_count(), 1);
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Active);
}

#[tokio::test]
async fn stray_matching_processes_are_reaped() {
    let world = World::new();
    let stray = world.start(
        &["/usr/bin/ssh", "-N", "-L8888:198.51.100.5:8888", "devm"],
        None,
    );
    let engine = engine(&world);

    engine.ensure_connected(&tunneled_target()).await.unwrap();

    assert!(world.terminated.lock().unwrap().contains(&stray));
    assert_eq!(world.live_ssh_count(), 1);
}

#[tokio::test]
async fn ssh_failure_exhausts_attempts() {
    let world = World::new();
    *world.ssh_failure.lock().unwrap() = Some(ProcessOutput::new(
        Some(255),
        "",
        "ssh: connect to host devm port 22: Connection refused",
    ));
    let engine = engine(&world);

    let err = engine.ensure_connected(&tunneled_target()).await.unwrap_err();

    match err {
        CoreError::Connectivity { target, reason } => {
            assert_eq!(target, "titan-e2e");
            assert!(reason.contains("255"));
        }
        other => panic!("expected Connectivity, got {other:?}"),
    }
    let attempts = engine.config().tunnel.max_attempts;
    assert_eq!(
        world.ssh_spawns.load(Ordering::SeqCst),
        usize::try_from(attempts).unwrap()
    );
    assert!(engine.tunnels().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn port_that_never_opens_hits_the_deadline() {
    let world = World::new();
    *world.ssh_binds.lock().unwrap() = false;
    let engine = engine(&world);

    let err = engine.ensure_connected(&tunneled_target()).await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::Connectivity { ref reason, .. } if reason.contains("not accepting")
    ));
    // Each failed attempt's half-started process is cleaned up.
    assert_eq!(world.live_ssh_count(), 0);
}

#[tokio::test]
async fn disconnect_tears_down_only_our_tunnel() {
    let world = World::new();
    let engine = engine(&world);
    let target = tunneled_target();

    engine.ensure_connected(&target).await.unwrap();
    assert_eq!(engine.tunnels().await.len(), 1);

    assert!(engine.disconnect(&target).await);
    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Absent);
    assert_eq!(world.live_ssh_count(), 0);
    assert!(engine.tunnels().await.is_empty());

    // Already absent: nothing to do, and not an error.
    assert!(!engine.disconnect(&target).await);

    let squatter = world.start(&["nc", "-l", "8888"], Some(8888));
    assert!(!engine.disconnect(&target).await);
    assert!(!world.terminated.lock().unwrap().contains(&squatter));
}

#[tokio::test]
async fn externally_killed_tunnel_is_noticed() {
    let world = World::new();
    let engine = engine(&world);
    let target = tunneled_target();

    let tunnel = engine.ensure_connected(&target).await.unwrap();
    world.kill_externally(tunnel.pid.unwrap());

    assert_eq!(engine.tunnel_status(&target).await, TunnelState::Absent);
    assert!(engine.tunnels().await.is_empty());

    let again = engine.ensure_connected(&target).await.unwrap();
    assert_ne!(again.pid, tunnel.pid);
    assert_eq!(world.ssh_spawns.load(Ordering::SeqCst), 2);
}
