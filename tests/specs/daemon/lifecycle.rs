//! Daemon lifecycle specs
//!
//! Startup, exclusive ownership of the log directory, and durability
//! across restarts.

use crate::prelude::*;

#[tokio::test]
async fn client_says_hello_on_connect() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    assert_eq!(client.cached_logs(), 0);
}

#[tokio::test]
async fn second_daemon_on_same_directory_is_refused() {
    let daemon = Daemon::start().await;
    let config = config_for(&daemon.log_dir());
    let err = gdp_daemon::startup(&config).await.unwrap_err();
    assert!(
        matches!(err, gdp_daemon::LifecycleError::LockFailed(_)),
        "{}",
        err
    );
}

#[tokio::test]
async fn records_survive_restart() {
    let mut daemon = Daemon::start().await;
    let name = {
        let client = daemon.client().await;
        let log = create(&client, &daemon, "lifecycle.durable").await;
        client.append(&log, "before restart").await.unwrap();
        let name = log.name();
        assert_eq!(client.close(log).await.unwrap(), 1);
        name
    };

    daemon.restart().await;

    let client = daemon.client().await;
    let log = client.open_log(name, IoMode::ReadAppend).await.unwrap();
    assert_eq!(log.count(), 1);
    assert_eq!(log.metadata(), &metadata("lifecycle.durable"));
    assert_eq!(&client.read(&log, 1).await.unwrap().data[..], b"before restart");

    let next = client.append(&log, "after restart").await.unwrap();
    assert_eq!(next.recno, 2);
}

#[tokio::test]
async fn stopped_daemon_disconnects_clients() {
    let mut daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "lifecycle.stop").await;
    let mut sub = client.subscribe(&log, 1, 0, None).await.unwrap();

    daemon.stop().await;

    match next_event(&mut sub).await {
        Some(SubscriptionEvent::Shutdown(_)) | Some(SubscriptionEvent::EndOfSubscription { .. }) => {}
        other => panic!("expected the subscription to end, got {:?}", other),
    }
}

#[tokio::test]
async fn close_reports_final_count() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "lifecycle.close").await;
    client.append(&log, "x").await.unwrap();
    client.append(&log, "y").await.unwrap();

    assert_eq!(client.close(log).await.unwrap(), 2);
    assert_eq!(client.cached_logs(), 0);
}
