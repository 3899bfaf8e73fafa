use std::env;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use taxpayer_registry_api::db::Database;
use taxpayer_registry_api::models::{IdentificationType, TaxpayerData, TaxpayerFilter};
use taxpayer_registry_api::reconciliation::ReconciliationEngine;
use taxpayer_registry_api::registry_client::RegistryClient;
use taxpayer_registry_api::taxpayer_store::{PgTaxpayerStore, TaxpayerStore, UniqueField};

/// Integration tests against a real PostgreSQL database.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
async fn store() -> anyhow::Result<PgTaxpayerStore> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;
    let db = Database::new(&db_url, 2).await?;
    db.migrate().await?;
    Ok(PgTaxpayerStore::new(db.pool.clone()))
}

/// Unique 10-digit cedula so repeated runs do not collide.
fn unique_cedula() -> String {
    format!("9{:09}", Uuid::new_v4().as_u128() % 1_000_000_000)
}

fn person(cedula: &str) -> TaxpayerData {
    let mut data = TaxpayerData::new(cedula, IdentificationType::NationalId);
    data.full_name = Some("Test Person".to_string());
    data.email = Some(format!("{}@example.test", cedula));
    data.city = Some("QUITO".to_string());
    data
}

#[tokio::test]
#[ignore]
async fn insert_update_and_soft_delete_roundtrip() -> anyhow::Result<()> {
    let store = store().await?;
    let cedula = unique_cedula();

    let created = store.insert(&person(&cedula)).await?;
    assert!(created.deleted_at.is_none());
    assert!(store.exists(UniqueField::IdentificationNumber, &cedula, None).await?);
    assert!(!store
        .exists(UniqueField::IdentificationNumber, &cedula, Some(created.id))
        .await?);

    let mut changed = created.data.clone();
    changed.mobile_phone = Some("0991234567".to_string());
    changed.legal_representatives = Some(json!([{"nombre": "X"}]));
    let updated = store.update(created.id, &changed).await?;
    assert_eq!(updated.data, changed);
    assert!(updated.updated_at >= created.updated_at);

    assert!(store.soft_delete(created.id).await?);
    assert!(!store.soft_delete(created.id).await?);
    assert!(store.find_by_id(created.id).await?.is_none());
    assert!(!store.exists(UniqueField::IdentificationNumber, &cedula, None).await?);

    // A deleted record frees its identification
    let again = store.insert(&person(&cedula)).await?;
    assert_ne!(again.id, created.id);
    store.soft_delete(again.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn duplicate_insert_is_a_conflict() -> anyhow::Result<()> {
    let store = store().await?;
    let cedula = unique_cedula();
    let created = store.insert(&person(&cedula)).await?;

    let err = store
        .insert(&person(&cedula))
        .await
        .expect_err("unique index should reject the duplicate");
    assert_eq!(err.kind(), taxpayer_registry_api::errors::ErrorKind::Conflict);

    store.soft_delete(created.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn list_filters_by_city_case_insensitively() -> anyhow::Result<()> {
    let store = store().await?;
    let cedula = unique_cedula();
    let mut data = person(&cedula);
    data.city = Some(format!("CIUDAD-{}", cedula));
    let created = store.insert(&data).await?;

    let page = store
        .list(&TaxpayerFilter {
            city: Some(format!("ciudad-{}", cedula)),
            ..Default::default()
        })
        .await?;
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, created.id);

    store.soft_delete(created.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn reconciliation_upsert_reuses_the_live_record() -> anyhow::Result<()> {
    let store: Arc<dyn TaxpayerStore> = Arc::new(store().await?);
    // Upsert never calls the registry
    let client = RegistryClient::new("http://127.0.0.1:1", "unused")?;
    let engine = ReconciliationEngine::new(client, store.clone());

    let cedula = unique_cedula();
    let first_id = engine.upsert(&person(&cedula)).await?;

    let mut newer = person(&cedula);
    newer.email = None;
    newer.marital_status = Some("CASADO".to_string());
    let second_id = engine.upsert(&newer).await?;
    assert_eq!(first_id, second_id);

    let stored = store
        .find_by(UniqueField::IdentificationNumber, &cedula)
        .await?
        .ok_or_else(|| anyhow::anyhow!("record missing"))?;
    assert_eq!(stored.data.email, None);
    assert_eq!(stored.data.marital_status.as_deref(), Some("CASADO"));

    store.soft_delete(first_id).await?;
    Ok(())
}
