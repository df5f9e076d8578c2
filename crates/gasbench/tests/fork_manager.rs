//! Tests for the fork session lifecycle, using placeholder processes instead of real forks.
#![cfg(unix)]

use std::{sync::Arc, time::Duration};

use gasbench::{
    test_utils::*, ConfigError, ForkConfig, ForkError, ForkManager, NetworkRegistry, SessionKey,
};

fn manager(backend: ProcessBackend) -> ForkManager<ProcessBackend> {
    manager_with(backend, fork_config())
}

fn manager_with(backend: ProcessBackend, config: ForkConfig) -> ForkManager<ProcessBackend> {
    ForkManager::new(backend, Arc::new(NetworkRegistry::builtin()), config)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_list_and_teardown() {
    let forks = manager(ProcessBackend::healthy());
    let session = forks.create("ethereum", Some(19_000_000)).await.unwrap();

    assert_eq!(session.chain_id, 1);
    assert_eq!(session.block_number, Some(19_000_000));
    assert!(session.alive);
    assert!(fork_config().port_range().contains(&session.port));
    assert!(forks.ports().is_reserved(session.port));
    assert_eq!(forks.get("ethereum", session.port), Some(session.clone()));
    assert_eq!(forks.list_active(), [session.clone()]);

    let launches = forks.backend().launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].port, session.port);
    assert_eq!(launches[0].block_number, Some(19_000_000));

    forks.teardown(&session.key()).await.unwrap();
    assert!(forks.list_active().is_empty());
    assert!(!forks.ports().is_reserved(session.port));
    assert_eq!(forks.get("ethereum", session.port), None);

    // Tearing down again is a no-op.
    forks.teardown(&session.key()).await.unwrap();
    forks.teardown(&SessionKey::new("nowhere", 1)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_sessions_get_distinct_ports() {
    let forks = manager(ProcessBackend::healthy());
    let (a, b, c) = tokio::join!(
        forks.create("ethereum", None),
        forks.create("ethereum", None),
        forks.create("base", None),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_ne!(a.port, b.port);
    assert_ne!(a.port, c.port);
    assert_ne!(b.port, c.port);
    assert_eq!(forks.list_active().len(), 3);
    assert_eq!(forks.ports().reserved_count(), 3);

    let report = forks.teardown_all().await;
    assert!(report.is_clean());
    assert_eq!(report.stopped.len(), 3);
    assert!(forks.list_active().is_empty());
    assert_eq!(forks.ports().reserved_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_failure_releases_port() {
    let forks = manager(ProcessBackend::healthy().failing("base"));
    let err = forks.create("base", None).await.unwrap_err();

    assert!(matches!(err, ForkError::Spawn { ref network, .. } if network == "base"));
    assert_eq!(forks.ports().reserved_count(), 0);
    assert!(forks.list_active().is_empty());

    // The failure does not affect other networks.
    let session = forks.create("ethereum", None).await.unwrap();
    assert_eq!(forks.list_active(), [session]);
    forks.teardown_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unhealthy_fork_times_out() {
    let config = ForkConfig { startup_timeout_ms: 200, ..fork_config() };
    let forks = manager_with(ProcessBackend::unresponsive(), config);

    let started = std::time::Instant::now();
    let err = forks.create("ethereum", None).await.unwrap_err();
    assert!(matches!(
        err,
        ForkError::Timeout { waited, .. } if waited == Duration::from_millis(200)
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(forks.ports().reserved_count(), 0);
    assert!(forks.list_active().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_network_allocates_nothing() {
    let forks = manager(ProcessBackend::healthy());
    let err = forks.create("solana", None).await.unwrap_err();

    assert!(matches!(
        err,
        ForkError::Network(ConfigError::UnsupportedNetwork(ref id)) if id == "solana"
    ));
    assert!(forks.backend().launches().is_empty());
    assert_eq!(forks.ports().reserved_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exhausted_port_range() {
    let config = ForkConfig { port_range_start: 18_700, port_range_end: 18_700, ..fork_config() };
    let forks = manager_with(ProcessBackend::healthy(), config);

    let first = forks.create("ethereum", None).await.unwrap();
    assert!(matches!(
        forks.create("ethereum", None).await,
        Err(ForkError::NoFreePort { start: 18_700, end: 18_700 })
    ));

    // The port is reusable once the session is gone.
    forks.teardown(&first.key()).await.unwrap();
    let second = forks.create("ethereum", None).await.unwrap();
    assert_eq!(second.port, first.port);
    forks.teardown_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crashed_fork_is_reaped() {
    let forks = manager(ProcessBackend::healthy().crashing("base"));
    let crashed = forks.create("base", None).await.unwrap();
    let healthy = forks.create("ethereum", None).await.unwrap();
    assert_eq!(forks.list_active().len(), 2);

    assert!(eventually(Duration::from_secs(10), || forks.list_active().len() == 1).await);
    assert_eq!(forks.list_active(), [healthy]);
    assert_eq!(forks.get("base", crashed.port), None);
    assert!(!forks.ports().is_reserved(crashed.port));

    // Tearing down a reaped session is a no-op.
    forks.teardown(&crashed.key()).await.unwrap();
    forks.teardown_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_teardown_kills_fork_ignoring_sigterm() {
    let forks = manager(ProcessBackend::healthy().ignoring_term("ethereum"));
    let session = forks.create("ethereum", None).await.unwrap();
    let grace = fork_config().shutdown_grace();
    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    forks.teardown(&session.key()).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= grace, "killed after {elapsed:?}, before the grace period");
    assert!(elapsed < grace + Duration::from_secs(5));
    assert!(forks.list_active().is_empty());
    assert!(!forks.ports().is_reserved(session.port));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_teardown_of_cooperative_fork_skips_grace_period() {
    let config = ForkConfig { shutdown_grace_ms: 10_000, ..fork_config() };
    let forks = manager_with(ProcessBackend::healthy(), config);
    let session = forks.create("ethereum", None).await.unwrap();

    let started = std::time::Instant::now();
    forks.teardown(&session.key()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fork_output_is_drained() {
    // The fork blocks on a full stderr pipe, and never exits, unless its output is read.
    let forks = manager(ProcessBackend::healthy().chatty("ethereum"));
    let session = forks.create("ethereum", None).await.unwrap();

    assert!(eventually(Duration::from_secs(10), || forks.list_active().is_empty()).await);
    assert!(!forks.ports().is_reserved(session.port));
}
