use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{
    Availability, CreateTaxpayerRequest, Page, Taxpayer, TaxpayerData, TaxpayerFilter,
    TaxpayerPatch,
};
use crate::taxpayer_store::{TaxpayerStore, UniqueField};
use crate::validation::{
    check_tax_profile, check_taxpayer_consistency, check_taxpayer_lengths, normalize_email,
    require_email,
};

/// Taxpayer registration, lookups and maintenance on top of a [`TaxpayerStore`].
#[derive(Clone)]
pub struct TaxpayerService {
    store: Arc<dyn TaxpayerStore>,
}

fn trim_opt(value: &mut Option<String>) {
    if let Some(v) = value.take() {
        let trimmed = v.trim();
        if !trimmed.is_empty() {
            *value = Some(trimmed.to_string());
        }
    }
}

/// Trims free text and turns blank strings into absent values.
fn tidy(data: &mut TaxpayerData) {
    data.identification_number = data.identification_number.trim().to_string();
    data.email = data.email.take().map(|e| normalize_email(&e));
    for slot in [
        &mut data.email,
        &mut data.mobile_phone,
        &mut data.landline_phone,
        &mut data.address,
        &mut data.country,
        &mut data.province,
        &mut data.city,
        &mut data.full_name,
        &mut data.nationality,
        &mut data.marital_status,
        &mut data.gender,
        &mut data.legal_name,
        &mut data.trade_name,
        &mut data.company_type,
        &mut data.taxpayer_type,
        &mut data.tax_regime,
        &mut data.category,
        &mut data.withholding_agent,
        &mut data.special_taxpayer,
        &mut data.primary_economic_activity,
        &mut data.cancellation_reason,
    ] {
        trim_opt(slot);
    }
}

impl TaxpayerService {
    pub fn new(store: Arc<dyn TaxpayerStore>) -> Self {
        Self { store }
    }

    /// Registry-sourced records may lack an email, so it is only mandatory
    /// when `email_required` is set (direct registration).
    fn validate(data: &TaxpayerData, email_required: bool) -> Result<(), AppError> {
        check_taxpayer_lengths(data)?;
        match data.email.as_deref() {
            Some(email) => require_email(email)?,
            None if email_required => {
                return Err(AppError::Validation("email is required".to_string()))
            }
            None => {}
        }
        check_taxpayer_consistency(data)
    }

    /// Rejects values already held by another live record. With
    /// `previous`, only fields whose value changed are checked.
    async fn ensure_unique(
        &self,
        data: &TaxpayerData,
        own_id: Option<i64>,
        previous: Option<&TaxpayerData>,
    ) -> Result<(), AppError> {
        for field in UniqueField::ALL {
            let Some(value) = field.value_of(data) else {
                continue;
            };
            if previous.is_some_and(|p| field.value_of(p) == Some(value)) {
                continue;
            }
            if self.store.exists(field, value, own_id).await? {
                return Err(AppError::Conflict(format!(
                    "{} '{}' is already registered",
                    field.column(),
                    value
                )));
            }
        }
        Ok(())
    }

    pub async fn create(&self, request: CreateTaxpayerRequest) -> Result<Taxpayer, AppError> {
        let mut data = TaxpayerData::from(request);
        tidy(&mut data);
        Self::validate(&data, true)?;
        check_tax_profile(&data)?;
        self.ensure_unique(&data, None, None).await?;

        let created = self.store.insert(&data).await?;
        tracing::info!(
            "Registered taxpayer {} ({})",
            created.id,
            created.data.identification_number
        );
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Taxpayer, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Taxpayer {} not found", id)))
    }

    async fn get_by(&self, field: UniqueField, value: &str) -> Result<Taxpayer, AppError> {
        self.store.find_by(field, value).await?.ok_or_else(|| {
            AppError::NotFound(format!("No taxpayer with {} '{}'", field.column(), value))
        })
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Taxpayer, AppError> {
        self.get_by(UniqueField::Email, &normalize_email(email)).await
    }

    pub async fn get_by_identification(&self, number: &str) -> Result<Taxpayer, AppError> {
        self.get_by(UniqueField::IdentificationNumber, number.trim())
            .await
    }

    pub async fn get_by_legal_name(&self, legal_name: &str) -> Result<Taxpayer, AppError> {
        self.get_by(UniqueField::LegalName, legal_name.trim()).await
    }

    pub async fn list(&self, filter: &TaxpayerFilter) -> Result<Page<Taxpayer>, AppError> {
        self.store.list(filter).await
    }

    /// Applies only the fields present in `patch`, then re-validates the
    /// merged record.
    pub async fn update(&self, id: i64, patch: TaxpayerPatch) -> Result<Taxpayer, AppError> {
        let current = self.get(id).await?;
        let mut data = current.data.clone();
        patch.apply(&mut data)?;
        tidy(&mut data);
        Self::validate(&data, false)?;
        self.ensure_unique(&data, Some(id), Some(&current.data))
            .await?;

        if data == current.data {
            return Ok(current);
        }

        let updated = self.store.update(id, &data).await?;
        tracing::info!("Updated taxpayer {}", id);
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if !self.store.soft_delete(id).await? {
            return Err(AppError::NotFound(format!("Taxpayer {} not found", id)));
        }
        tracing::info!("Deleted taxpayer {}", id);
        Ok(())
    }

    pub async fn availability(
        &self,
        field: UniqueField,
        value: &str,
    ) -> Result<Availability, AppError> {
        let value = match field {
            UniqueField::Email => normalize_email(value),
            _ => value.trim().to_string(),
        };
        let taken = self.store.exists(field, &value, None).await?;
        Ok(Availability {
            field: field.column(),
            value,
            available: !taken,
        })
    }
}
