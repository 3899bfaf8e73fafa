//! Registry reconciliation: validate an identification, fetch the
//! authoritative registry document, normalize it into a taxpayer record and
//! upsert it.
//!
//! The caller always receives the raw registry document. Storing the
//! normalized snapshot is best effort: a store failure is logged and
//! swallowed.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{
    ConsultRequest, IdentificationType, InvalidIdentification, TaxpayerData, TaxpayerStatus, YesNo,
};
use crate::registry_client::RegistryClient;
use crate::registry_models::{RegistryField, RegistryRecord};
use crate::taxpayer_store::{TaxpayerStore, UniqueField};
use crate::validation::normalize_email;

/// Registry responses never carry a country; every record is domestic.
pub const REGISTRY_COUNTRY: &str = "ECUADOR";

/// Trailing establishment code every company tax ID carries.
pub const RUC_SUFFIX: &str = "001";

const REGISTRY_DATE_FORMAT: &str = "%d/%m/%Y";

/// Outcome of a consult call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConsultOutcome {
    /// The identification failed the shape check; no external call was made.
    Invalid(InvalidIdentification),
    /// The registry document, verbatim.
    Found(Value),
}

/// Classifies an identification by shape: 10 characters is a national ID,
/// 13 ending in `001` a company tax ID.
pub fn classify_identification(identification: &str) -> Result<IdentificationType, String> {
    match identification.chars().count() {
        10 => Ok(IdentificationType::NationalId),
        13 if identification.ends_with(RUC_SUFFIX) => Ok(IdentificationType::Ruc),
        13 => Err(format!(
            "A 13-digit identification must end in {}",
            RUC_SUFFIX
        )),
        _ => Err("The identification must have 10 or 13 digits".to_string()),
    }
}

/// Parses `DD/MM/YYYY`; anything else is treated as absent.
pub fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), REGISTRY_DATE_FORMAT).ok()
}

/// Maps a registry record onto the taxpayer shape.
///
/// Person-only fields stay absent for company identifications and vice
/// versa. `requested` is used when the registry omits the identification.
pub fn normalize(
    kind: IdentificationType,
    requested: &str,
    record: &RegistryRecord<'_>,
) -> TaxpayerData {
    let identification = record
        .text(RegistryField::IdentificationNumber)
        .unwrap_or_else(|| requested.to_string());

    let mut data = TaxpayerData::new(identification, kind);
    data.email = record
        .text(RegistryField::Email)
        .map(|email| normalize_email(&email));
    data.mobile_phone = record.text(RegistryField::MobilePhone);
    data.landline_phone = record.text(RegistryField::LandlinePhone);
    data.address = record.text(RegistryField::Address);
    data.country = Some(REGISTRY_COUNTRY.to_string());
    data.province = record.division_text(RegistryField::Province);
    data.city = record.division_text(RegistryField::City);

    data.taxpayer_type = record.text(RegistryField::TaxpayerType);
    data.taxpayer_status = record.text(RegistryField::TaxpayerStatus).and_then(|raw| {
        let status = TaxpayerStatus::from_code(&raw);
        if status.is_none() {
            tracing::debug!("Unrecognized taxpayer status from registry: {}", raw);
        }
        status
    });
    data.tax_regime = record.text(RegistryField::TaxRegime);
    data.category = record.text(RegistryField::Category);
    data.accounting_obligation = record
        .text(RegistryField::AccountingObligation)
        .and_then(|raw| YesNo::from_code(&raw));
    data.withholding_agent = record.text(RegistryField::WithholdingAgent);
    data.special_taxpayer = record.text(RegistryField::SpecialTaxpayer);
    data.primary_economic_activity = record.text(RegistryField::PrimaryEconomicActivity);
    data.cancellation_reason = record.text(RegistryField::CancellationReason);

    match kind {
        IdentificationType::Ruc => {
            data.legal_name = record.text(RegistryField::LegalName);
            data.trade_name = record.text(RegistryField::TradeName);
            data.legal_representatives = record.raw(RegistryField::LegalRepresentatives).cloned();
            data.branches = record.raw(RegistryField::Branches).cloned();
        }
        _ => {
            data.full_name = record.text(RegistryField::FullName);
            data.gender = record.text(RegistryField::Gender);
            data.marital_status = record.text(RegistryField::MaritalStatus);
            data.nationality = record.text(RegistryField::Nationality);
            data.birth_date = record
                .text(RegistryField::BirthDate)
                .and_then(|raw| parse_registry_date(&raw));
        }
    }

    data
}

/// Short, non-reversible tag for a caller token, safe for logs.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Validates, fetches, normalizes and upserts registry data.
#[derive(Clone)]
pub struct ReconciliationEngine {
    client: RegistryClient,
    store: Arc<dyn TaxpayerStore>,
}

impl ReconciliationEngine {
    pub fn new(client: RegistryClient, store: Arc<dyn TaxpayerStore>) -> Self {
        Self { client, store }
    }

    /// Runs one consult.
    ///
    /// # Returns
    ///
    /// * `Ok(ConsultOutcome::Invalid)` - shape check failed, nothing fetched.
    /// * `Ok(ConsultOutcome::Found)` - the raw registry document.
    /// * `Err(_)` - registry unreachable, non-200, or not the expected shape.
    pub async fn reconcile(&self, request: &ConsultRequest) -> Result<ConsultOutcome, AppError> {
        // Classified as received: surrounding whitespace counts toward the length
        let identification = request.identification_number.as_str();
        tracing::info!(
            "Consult {} (caller token {})",
            identification,
            token_fingerprint(&request.token)
        );

        let kind = match classify_identification(identification) {
            Ok(kind) => kind,
            Err(message) => {
                tracing::warn!("Rejected identification {}: {}", identification, message);
                return Ok(ConsultOutcome::Invalid(InvalidIdentification {
                    identification_number: identification.to_string(),
                    status: "invalid",
                    message,
                }));
            }
        };

        let document = self.client.lookup(kind, identification).await?;
        let record = RegistryRecord::from_document(&document)?;
        let data = normalize(kind, identification, &record);

        if let Err(e) = self.upsert(&data).await {
            tracing::error!(
                "Failed to store registry snapshot for {}: {}",
                data.identification_number,
                e
            );
        }

        Ok(ConsultOutcome::Found(document))
    }

    /// Inserts the snapshot or overwrites the existing record wholesale,
    /// keeping only its id.
    pub async fn upsert(&self, data: &TaxpayerData) -> Result<i64, AppError> {
        let existing = self
            .store
            .find_by(UniqueField::IdentificationNumber, &data.identification_number)
            .await?;

        match existing {
            Some(current) => {
                let updated = self.store.update(current.id, data).await?;
                tracing::info!(
                    "Refreshed taxpayer {} from registry ({})",
                    updated.id,
                    updated.data.identification_number
                );
                Ok(updated.id)
            }
            None => {
                let created = self.store.insert(data).await?;
                tracing::info!(
                    "Created taxpayer {} from registry ({})",
                    created.id,
                    created.data.identification_number
                );
                Ok(created.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_by_length_and_suffix() {
        assert_eq!(
            classify_identification("0501234567"),
            Ok(IdentificationType::NationalId)
        );
        assert_eq!(
            classify_identification("1790012345001"),
            Ok(IdentificationType::Ruc)
        );
        assert!(classify_identification("1790012345002").is_err());
        assert!(classify_identification("12345").is_err());
        assert!(classify_identification("").is_err());
    }

    #[test]
    fn registry_dates_are_day_first() {
        assert_eq!(
            parse_registry_date("05/03/1990"),
            NaiveDate::from_ymd_opt(1990, 3, 5)
        );
        assert_eq!(parse_registry_date("1990-03-05"), None);
        assert_eq!(parse_registry_date("31/02/1990"), None);
    }

    #[test]
    fn company_snapshot_keeps_opaque_blobs() {
        let doc = json!({"resultado": {
            "NumeroRuc": "1790012345001",
            "RazonSocial": "ACME S.A.",
            "NombreComercial": "",
            "RepresentantesLegales": [{"Nombre": "Ana", "Cedula": "0101010101"}],
            "Sucursales": {"total": 2},
            "EstadoContribuyente": "ACTIVO",
            "ObligadoContabilidad": "SI",
            "NombreCiudadano": "should be ignored"
        }});
        let record = RegistryRecord::from_document(&doc).unwrap();
        let data = normalize(IdentificationType::Ruc, "1790012345001", &record);

        assert_eq!(data.legal_name.as_deref(), Some("ACME S.A."));
        assert_eq!(data.trade_name, None);
        assert_eq!(
            data.legal_representatives,
            Some(json!([{"Nombre": "Ana", "Cedula": "0101010101"}]))
        );
        assert_eq!(data.branches, Some(json!({"total": 2})));
        assert_eq!(data.taxpayer_status, Some(TaxpayerStatus::Activo));
        assert_eq!(data.accounting_obligation, Some(YesNo::Yes));
        assert_eq!(data.full_name, None);
        assert_eq!(data.country.as_deref(), Some(REGISTRY_COUNTRY));
    }

    #[test]
    fn padded_identifications_are_not_trimmed() {
        assert!(classify_identification("0501234567 ").is_err());
        assert!(classify_identification(" 0501234567").is_err());
        assert!(classify_identification("179001234500 ").is_err());
    }

    #[test]
    fn registry_emails_are_normalized() {
        let doc = json!({"resultado": {
            "Cedula": "0501234567",
            "NombreCiudadano": "JUAN PEREZ",
            "Email": " JUAN.PEREZ@EXAMPLE.COM "
        }});
        let record = RegistryRecord::from_document(&doc).unwrap();
        let data = normalize(IdentificationType::NationalId, "0501234567", &record);
        assert_eq!(data.email.as_deref(), Some("juan.perez@example.com"));
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = token_fingerprint("secret-token");
        assert_eq!(a.len(), 12);
        assert_eq!(a, token_fingerprint("secret-token"));
        assert_ne!(a, token_fingerprint("other"));
    }

    #[test]
    fn invalid_outcome_serializes_flat() {
        let outcome = ConsultOutcome::Invalid(InvalidIdentification {
            identification_number: "123".into(),
            status: "invalid",
            message: "The identification must have 10 or 13 digits".into(),
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "invalid");
        assert_eq!(value["numeroIdentificacion"], "123");
    }
}
