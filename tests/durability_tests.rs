/// Durability tests
///
/// Committed pipeline writes survive a restart; rolled-back ones never reach disk.
/// Run with: cargo test --test durability_tests
use rowgate::storage::DurabilityMode;
use rowgate::{
    AppConfig, EndpointConfig, EndpointController, FixedStatusGateway, InMemoryRecordStore, Input,
    Record, RecordStore, RecordType, Rowgate,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Arc<InMemoryRecordStore> {
    Arc::new(InMemoryRecordStore::open(dir, DurabilityMode::Sync, Duration::from_secs(1)).unwrap())
}

#[tokio::test]
async fn test_committed_update_survives_restart() {
    let dir = tempdir().unwrap();

    {
        let store = open(dir.path());
        store
            .seed(vec![Record::new(1, "seed", RecordType::BankAccount)])
            .await
            .unwrap();
        let controller = EndpointController::new(
            store.clone(),
            Arc::new(FixedStatusGateway::accepting()),
            &EndpointConfig::default(),
        );
        let result = controller
            .handle(&Input::new(1, "test", "bank_account").with_detail("iban", "DE00"))
            .await;
        assert!(result.is_success());
    }

    let reopened = open(dir.path());
    let record = reopened.get(1).await.unwrap().unwrap();
    assert_eq!(record.name, "test_object");
    assert_eq!(record.version, 2);
    assert_eq!(record.fields["iban"], "DE00");
}

#[tokio::test]
async fn test_rolled_back_update_never_reaches_disk() {
    let dir = tempdir().unwrap();

    {
        let store = open(dir.path());
        store
            .seed(vec![Record::new(1, "seed", RecordType::BankAccount)])
            .await
            .unwrap();
        let controller = EndpointController::new(
            store.clone(),
            Arc::new(FixedStatusGateway::new(500)),
            &EndpointConfig::default(),
        );
        let result = controller.handle(&Input::new(1, "test", "bank_account")).await;
        assert!(!result.is_success());
    }

    let reopened = open(dir.path());
    let record = reopened.get(1).await.unwrap().unwrap();
    assert_eq!(record.name, "seed");
    assert_eq!(record.version, 1);
}

#[tokio::test]
async fn test_checkpoint_then_more_commits() {
    let dir = tempdir().unwrap();

    {
        let store = open(dir.path());
        store
            .seed(vec![Record::new(1, "seed", RecordType::BankAccount)])
            .await
            .unwrap();
        let controller = EndpointController::new(
            store.clone(),
            Arc::new(FixedStatusGateway::accepting()),
            &EndpointConfig::default(),
        );
        assert!(controller.handle(&Input::new(1, "a", "bank_account")).await.is_success());
        store.checkpoint().await.unwrap();
        assert!(controller.handle(&Input::new(1, "b", "bank_account")).await.is_success());
    }

    let reopened = open(dir.path());
    let record = reopened.get(1).await.unwrap().unwrap();
    assert_eq!(record.name, "b_object");
    assert_eq!(record.version, 3);
}

#[tokio::test]
async fn test_wiring_uses_data_dir() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    let config = AppConfig::from_lookup(|key| match key {
        "ROWGATE_DATA_DIR" => Some(data_dir.clone()),
        _ => None,
    })
    .unwrap();

    {
        let app = Rowgate::from_config(&config).unwrap();
        app.store
            .seed(vec![Record::new(1, "seed", RecordType::BankAccount)])
            .await
            .unwrap();
        assert!(app.controller.handle(&Input::new(1, "ok", "bank_account")).await.is_success());
    }

    let app = Rowgate::from_config(&config).unwrap();
    assert_eq!(app.store.get(1).await.unwrap().unwrap().name, "ok_object");
}
