//! Subscription and multiread specs

use crate::prelude::*;

#[tokio::test]
async fn subscriber_gets_backlog_then_live_records() {
    let daemon = Daemon::start().await;
    let writer = daemon.client().await;
    let log = create(&writer, &daemon, "subscribe.live").await;
    writer.append(&log, "old").await.unwrap();

    let reader = daemon.client().await;
    let opened = reader.open_log(log.name(), IoMode::ReadOnly).await.unwrap();
    let mut sub = reader.subscribe(&opened, 1, 0, None).await.unwrap();
    assert_eq!(data_of(next_event(&mut sub).await), (1, Bytes::from("old")));

    writer.append(&log, "new").await.unwrap();
    assert_eq!(data_of(next_event(&mut sub).await), (2, Bytes::from("new")));
}

#[tokio::test]
async fn counted_subscription_ends_after_count() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "subscribe.counted").await;

    let mut sub = client.subscribe(&log, 1, 2, None).await.unwrap();
    for body in ["a", "b", "c"] {
        client.append(&log, body).await.unwrap();
    }

    let (data, end) = tokio::time::timeout(WAIT, sub.collect_data()).await.unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(
        end,
        Some(SubscriptionEvent::EndOfSubscription { next_recno: Some(3) })
    );
}

#[tokio::test]
async fn multiread_returns_existing_records_then_ends() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "subscribe.multiread").await;
    for body in ["r1", "r2", "r3", "r4"] {
        client.append(&log, body).await.unwrap();
    }

    let mut sub = client.multiread(&log, 2, 0).await.unwrap();
    let (data, end) = tokio::time::timeout(WAIT, sub.collect_data()).await.unwrap();
    let recnos: Vec<_> = data.iter().map(|d| d.recno).collect();
    assert_eq!(recnos, vec![2, 3, 4]);
    assert!(matches!(end, Some(SubscriptionEvent::EndOfSubscription { .. })));
}

#[tokio::test]
async fn multiread_past_the_end_is_rejected() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "subscribe.pastend").await;
    client.append(&log, "x").await.unwrap();

    let err = client.multiread(&log, 5, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unsubscribe_ends_the_stream() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "subscribe.cancel").await;
    let mut sub = client.subscribe(&log, 1, 0, None).await.unwrap();

    client.unsubscribe(&log).await.unwrap();
    let event = next_event(&mut sub).await;
    assert!(
        matches!(event, Some(SubscriptionEvent::EndOfSubscription { .. })),
        "{:?}",
        event
    );
    assert_eq!(next_event(&mut sub).await, None);
}
