//! Append and read specs
//!
//! Records are numbered from 1 in append order and read back unchanged.

use crate::prelude::*;

#[tokio::test]
async fn appended_records_read_back_in_order() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "append.order").await;

    for (i, body) in ["alpha", "beta", "gamma"].iter().enumerate() {
        let datum = client.append(&log, *body).await.unwrap();
        assert_eq!(datum.recno, i as i64 + 1);
        assert!(datum.ts.is_valid());
    }

    assert_eq!(&client.read(&log, 1).await.unwrap().data[..], b"alpha");
    assert_eq!(&client.read(&log, 3).await.unwrap().data[..], b"gamma");
    assert_eq!(log.count(), 3);
}

#[tokio::test]
async fn non_positive_record_counts_back_from_end() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "append.relative").await;
    for body in ["one", "two", "three"] {
        client.append(&log, body).await.unwrap();
    }

    let last = client.read(&log, 0).await.unwrap();
    assert_eq!((last.recno, &last.data[..]), (3, &b"three"[..]));
    let before = client.read(&log, -1).await.unwrap();
    assert_eq!(before.recno, 2);
}

#[tokio::test]
async fn reading_past_the_end_is_not_found() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "append.missing").await;
    client.append(&log, "only").await.unwrap();

    let err = client.read(&log, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn another_client_sees_appended_records() {
    let daemon = Daemon::start().await;
    let writer = daemon.client().await;
    let log = create(&writer, &daemon, "append.shared").await;
    writer.append(&log, "from writer").await.unwrap();

    let reader = daemon.client().await;
    let opened = reader.open_log(log.name(), IoMode::ReadOnly).await.unwrap();
    assert_eq!(opened.count(), 1);
    assert_eq!(opened.metadata(), &metadata("append.shared"));
    assert_eq!(&reader.read(&opened, 1).await.unwrap().data[..], b"from writer");
}

#[tokio::test]
async fn read_only_handle_refuses_append() {
    let daemon = Daemon::start().await;
    let owner = daemon.client().await;
    let log = create(&owner, &daemon, "append.readonly").await;

    let other = daemon.client().await;
    let opened = other.open_log(log.name(), IoMode::ReadOnly).await.unwrap();
    let err = other.append(&opened, "nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadIoMode);
}

#[tokio::test]
async fn opening_unknown_log_is_not_found() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let err = client
        .open_log(GdpName::from_alias("specs.never.created"), IoMode::ReadOnly)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn creating_the_same_log_twice_fails() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let _log = create(&client, &daemon, "append.twice").await;

    let other = daemon.client().await;
    let err = other
        .create_log(daemon.name(), GdpName::ZERO, &metadata("append.twice"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn metadata_is_fetched_unchanged() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;
    let log = create(&client, &daemon, "append.metadata").await;
    let fetched = client.get_metadata(&log).await.unwrap();
    assert_eq!(fetched, metadata("append.metadata"));
    assert_eq!(fetched.alias().as_deref(), Some("append.metadata"));
}
