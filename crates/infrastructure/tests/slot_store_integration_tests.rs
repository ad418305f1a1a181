use std::sync::Arc;

use sms_domain::{SlotStatus, SlotStore};
use sms_errors::SmsError;
use sms_infrastructure::{InMemorySlotStore, SqliteSlotStore};

async fn stores(capacity: usize) -> Vec<(&'static str, Arc<dyn SlotStore>)> {
    let sqlite = SqliteSlotStore::connect("sqlite::memory:", capacity, 32)
        .await
        .unwrap();
    vec![
        ("memory", Arc::new(InMemorySlotStore::new(capacity, 32))),
        ("sqlite", Arc::new(sqlite)),
    ]
}

#[tokio::test]
async fn test_erased_index_is_reused() {
    for (name, store) in stores(4).await {
        assert_eq!(store.write(&[0x01], SlotStatus::Read).await.unwrap(), 1, "{name}");
        assert_eq!(store.write(&[0x02], SlotStatus::Read).await.unwrap(), 2, "{name}");
        assert_eq!(store.write(&[0x03], SlotStatus::Read).await.unwrap(), 3, "{name}");

        store.erase(2).await.unwrap();
        assert_eq!(store.write(&[0x04], SlotStatus::Unsent).await.unwrap(), 2, "{name}");
    }
}

#[tokio::test]
async fn test_read_all_lists_occupied_slots_in_order() {
    for (name, store) in stores(4).await {
        store.write(&[0xA1], SlotStatus::Unread).await.unwrap();
        store.write(&[0xA2], SlotStatus::Sent).await.unwrap();
        store.write(&[0xA3], SlotStatus::Read).await.unwrap();
        store.erase(1).await.unwrap();

        let records = store.read_all().await.unwrap();
        let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3], "{name}");
        assert_eq!(records[0].status, SlotStatus::Sent, "{name}");
        assert_eq!(records[0].data[0], 0xA2, "{name}");
        assert!(records.iter().all(|r| r.data.len() == 32), "{name}");
    }
}

#[tokio::test]
async fn test_full_store_rejects_write() {
    for (name, store) in stores(2).await {
        store.write(&[1], SlotStatus::Read).await.unwrap();
        store.write(&[2], SlotStatus::Read).await.unwrap();

        let err = store.write(&[3], SlotStatus::Read).await.unwrap_err();
        assert!(matches!(err, SmsError::CapacityExceeded { capacity: 2 }), "{name}");
        assert_eq!(store.read_all().await.unwrap().len(), 2, "{name}");
    }
}

#[tokio::test]
async fn test_update_out_of_range_is_not_found() {
    for (name, store) in stores(2).await {
        let err = store.update(5, SlotStatus::Read, &[1]).await.unwrap_err();
        assert!(matches!(err, SmsError::NotFound { index: 5 }), "{name}");
    }
}

#[tokio::test]
async fn test_concurrent_writes_get_distinct_slots() {
    for (name, store) in stores(8).await {
        let writes = (0..8u8).map(|i| {
            let store = store.clone();
            async move { store.write(&[i], SlotStatus::Unread).await }
        });
        let mut indices: Vec<usize> = futures::future::join_all(writes)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (1..=8).collect::<Vec<_>>(), "{name}");

        let err = store.write(&[9], SlotStatus::Unread).await.unwrap_err();
        assert!(matches!(err, SmsError::CapacityExceeded { .. }), "{name}");
    }
}

#[tokio::test]
async fn test_sqlite_store_is_durable_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("icc.db").display());

    {
        let store = SqliteSlotStore::connect(&url, 4, 32).await.unwrap();
        store.write(&[0x11, 0x22], SlotStatus::Unread).await.unwrap();
        store.write(&[0x33], SlotStatus::Sent).await.unwrap();
        store.erase(1).await.unwrap();
    }

    let reopened = SqliteSlotStore::connect(&url, 4, 32).await.unwrap();
    let records = reopened.read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].index, 2);
    assert_eq!(records[0].status, SlotStatus::Sent);

    assert_eq!(reopened.write(&[0x44], SlotStatus::Read).await.unwrap(), 1);
}
