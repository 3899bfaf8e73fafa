/// Taxpayer service tests over the in-memory store
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{json, Value};
use taxpayer_registry_api::errors::ErrorKind;
use taxpayer_registry_api::memory_store::MemoryTaxpayerStore;
use taxpayer_registry_api::models::{
    age_on, CreateTaxpayerRequest, IdentificationType, TaxpayerFilter, TaxpayerPatch,
    TaxpayerResponse,
};
use taxpayer_registry_api::services::TaxpayerService;
use taxpayer_registry_api::taxpayer_store::UniqueField;

fn service() -> (TaxpayerService, Arc<MemoryTaxpayerStore>) {
    let store = Arc::new(MemoryTaxpayerStore::new());
    (TaxpayerService::new(store.clone()), store)
}

/// Fills in the mandatory tax profile unless the body sets it.
fn request(mut body: Value) -> CreateTaxpayerRequest {
    let defaults = json!({
        "taxpayer_type": "PERSONA NATURAL",
        "taxpayer_status": "ACTIVO",
        "tax_regime": "GENERAL",
        "accounting_obligation": "NO",
        "primary_economic_activity": "COMERCIO AL POR MENOR",
    });
    let fields = body.as_object_mut().unwrap();
    if let Value::Object(defaults) = defaults {
        for (key, value) in defaults {
            fields.entry(key).or_insert(value);
        }
    }
    serde_json::from_value(body).unwrap()
}

fn person(id: &str, email: &str) -> CreateTaxpayerRequest {
    request(json!({
        "identification_number": id,
        "identification_type": "05",
        "email": email,
        "full_name": "Juan Perez",
        "city": "Quito",
    }))
}

fn company(id: &str, email: &str, legal_name: &str) -> CreateTaxpayerRequest {
    request(json!({
        "identification_number": id,
        "identification_type": "04",
        "email": email,
        "legal_name": legal_name,
    }))
}

fn patch(body: Value) -> TaxpayerPatch {
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn test_natural_person_requires_name() {
    let (service, store) = service();
    let err = service
        .create(request(json!({
            "identification_number": "0501234567",
            "identification_type": "05",
            "email": "juan@example.com",
        })))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("natural person requires name"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_legacy_name_key_satisfies_person_rule() {
    let (service, _store) = service();
    let created = service
        .create(request(json!({
            "numero_identificacion": "0501234567",
            "tipo_identificacion": "05",
            "email": "juan@example.com",
            "nombre": "Juan Perez",
            "ciudad": "Quito",
        })))
        .await
        .unwrap();
    assert_eq!(created.data.full_name.as_deref(), Some("Juan Perez"));
    assert_eq!(created.data.city.as_deref(), Some("Quito"));
}

#[tokio::test]
async fn test_blank_tax_profile_is_rejected() {
    let (service, store) = service();
    let err = service
        .create(request(json!({
            "identification_number": "0501234567",
            "identification_type": "05",
            "email": "juan@example.com",
            "full_name": "Juan Perez",
            "primary_economic_activity": "   ",
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("primary_economic_activity is required"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_ruc_requires_legal_name() {
    let (service, _store) = service();
    let err = service
        .create(request(json!({
            "identification_number": "1790012345001",
            "identification_type": "04",
            "email": "ventas@andina.ec",
        })))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("RUC requires legal name"));
}

#[tokio::test]
async fn test_create_with_birth_date_reports_age() {
    let (service, _store) = service();
    let created = service
        .create(request(json!({
            "identification_number": "0501234567",
            "identification_type": "05",
            "email": "  Juan@Example.COM ",
            "full_name": "Juan Perez",
            "birth_date": "1990-06-15",
        })))
        .await
        .unwrap();

    assert_eq!(created.data.email.as_deref(), Some("juan@example.com"));
    assert_eq!(created.data.identification_type, IdentificationType::NationalId);

    let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
    let today = Utc::now().date_naive();
    let response = TaxpayerResponse::from(created);
    assert_eq!(response.age, age_on(birth, today));
    assert!(response.age.unwrap() >= today.year() - 1991);
}

#[tokio::test]
async fn test_email_is_required_on_create() {
    let (service, _store) = service();
    let err = service
        .create(request(json!({
            "identification_number": "0501234567",
            "identification_type": "05",
            "email": "   ",
            "full_name": "Juan Perez",
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .create(person("0501234567", "not-an-email"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_duplicates_conflict_and_nothing_is_persisted() {
    let (service, store) = service();
    service
        .create(company("1790012345001", "ventas@andina.ec", "COMERCIAL ANDINA S.A."))
        .await
        .unwrap();

    let same_id = company("1790012345001", "otro@andina.ec", "OTRA S.A.");
    let same_email = company("1790099999001", "VENTAS@andina.ec", "OTRA S.A.");
    let same_name = company("1790099999001", "otro@andina.ec", "COMERCIAL ANDINA S.A.");

    for duplicate in [same_id, same_email, same_name] {
        let err = service.create(duplicate).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_partial_update_keeps_omitted_fields() {
    let (service, _store) = service();
    let created = service
        .create(person("0501234567", "juan@example.com"))
        .await
        .unwrap();

    let updated = service
        .update(created.id, patch(json!({ "mobile_phone": "0991234567" })))
        .await
        .unwrap();

    assert_eq!(updated.data.mobile_phone.as_deref(), Some("0991234567"));
    assert_eq!(updated.data.full_name.as_deref(), Some("Juan Perez"));
    assert_eq!(updated.data.city.as_deref(), Some("Quito"));
    assert_eq!(updated.data.email.as_deref(), Some("juan@example.com"));
}

#[tokio::test]
async fn test_null_clears_optional_field() {
    let (service, _store) = service();
    let created = service
        .create(person("0501234567", "juan@example.com"))
        .await
        .unwrap();

    let updated = service
        .update(created.id, patch(json!({ "city": null })))
        .await
        .unwrap();
    assert_eq!(updated.data.city, None);
    assert_eq!(updated.data.full_name.as_deref(), Some("Juan Perez"));
}

#[tokio::test]
async fn test_update_cannot_clear_required_fields() {
    let (service, _store) = service();
    let created = service
        .create(person("0501234567", "juan@example.com"))
        .await
        .unwrap();

    for body in [
        json!({ "identification_number": null }),
        json!({ "email": null }),
        json!({ "full_name": null }),
    ] {
        let err = service.update(created.id, patch(body)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn test_update_to_taken_email_conflicts() {
    let (service, _store) = service();
    service
        .create(person("0501234567", "juan@example.com"))
        .await
        .unwrap();
    let other = service
        .create(person("0607080910", "ana@example.com"))
        .await
        .unwrap();

    let err = service
        .update(other.id, patch(json!({ "email": "juan@example.com" })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Re-sending its own values is not a conflict
    let same = service
        .update(other.id, patch(json!({ "email": "ana@example.com" })))
        .await
        .unwrap();
    assert_eq!(same.id, other.id);
}

#[tokio::test]
async fn test_deleted_records_are_hidden_and_free_their_keys() {
    let (service, _store) = service();
    let created = service
        .create(person("0501234567", "juan@example.com"))
        .await
        .unwrap();

    service.delete(created.id).await.unwrap();
    assert_eq!(
        service.get(created.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        service.delete(created.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let availability = service
        .availability(UniqueField::IdentificationNumber, "0501234567")
        .await
        .unwrap();
    assert!(availability.available);

    service
        .create(person("0501234567", "juan@example.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_lookups_by_unique_fields() {
    let (service, _store) = service();
    let created = service
        .create(company("1790012345001", "ventas@andina.ec", "COMERCIAL ANDINA S.A."))
        .await
        .unwrap();

    let by_email = service.get_by_email("VENTAS@andina.ec").await.unwrap();
    let by_id = service.get_by_identification("1790012345001").await.unwrap();
    let by_name = service
        .get_by_legal_name("COMERCIAL ANDINA S.A.")
        .await
        .unwrap();
    assert_eq!(by_email.id, created.id);
    assert_eq!(by_id.id, created.id);
    assert_eq!(by_name.id, created.id);

    let taken = service
        .availability(UniqueField::Email, " ventas@ANDINA.ec ")
        .await
        .unwrap();
    assert!(!taken.available);
    assert_eq!(taken.value, "ventas@andina.ec");
}

#[tokio::test]
async fn test_list_paginates_and_filters() {
    let (service, _store) = service();
    for i in 0..12 {
        service
            .create(person(&format!("05012345{:02}", i), &format!("p{}@example.com", i)))
            .await
            .unwrap();
    }
    service
        .create(company("1790012345001", "ventas@andina.ec", "COMERCIAL ANDINA S.A."))
        .await
        .unwrap();

    let first = service.list(&TaxpayerFilter::default()).await.unwrap();
    assert_eq!(first.total, 13);
    assert_eq!(first.page, 1);
    assert_eq!(first.page_size, 10);
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_pages, 2);

    let second = service
        .list(&TaxpayerFilter {
            page: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.items.len(), 3);

    let companies = service
        .list(&TaxpayerFilter {
            identification_type: Some(IdentificationType::Ruc),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(companies.total, 1);
    assert_eq!(companies.items[0].data.identification_number, "1790012345001");

    let in_quito = service
        .list(&TaxpayerFilter {
            city: Some("quito".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(in_quito.total, 12);
}
