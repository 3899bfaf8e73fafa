//! Field-level checks shared by the CRUD services.

use regex::Regex;
use std::sync::OnceLock;

use crate::errors::AppError;
use crate::models::TaxpayerData;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$";

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN))
        .as_ref()
        .ok()
}

/// Simplified RFC 5322 check: `local@domain.tld`, at most 100 chars.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 100 {
        return false;
    }
    email_regex().map(|re| re.is_match(email)).unwrap_or(false)
}

/// Trims surrounding whitespace and lowercases, so lookups are stable.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn require_email(email: &str) -> Result<(), AppError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid email: {}", email)))
    }
}

pub fn require_non_blank(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

pub fn check_len(field: &str, value: Option<&str>, min: usize, max: usize) -> Result<(), AppError> {
    if let Some(value) = value {
        let len = value.chars().count();
        if len < min || len > max {
            return Err(AppError::Validation(if min == 0 {
                format!("{} must be at most {} characters", field, max)
            } else {
                format!("{} must be between {} and {} characters", field, min, max)
            }));
        }
    }
    Ok(())
}

/// Column size limits of the taxpayer table.
pub fn check_taxpayer_lengths(data: &TaxpayerData) -> Result<(), AppError> {
    let limits: [(&str, Option<&str>, usize, usize); 22] = [
        ("identification_number", Some(data.identification_number.as_str()), 10, 25),
        ("email", data.email.as_deref(), 0, 100),
        ("mobile_phone", data.mobile_phone.as_deref(), 0, 20),
        ("landline_phone", data.landline_phone.as_deref(), 0, 20),
        ("address", data.address.as_deref(), 0, 250),
        ("country", data.country.as_deref(), 0, 100),
        ("province", data.province.as_deref(), 0, 100),
        ("city", data.city.as_deref(), 0, 100),
        ("full_name", data.full_name.as_deref(), 0, 100),
        ("nationality", data.nationality.as_deref(), 0, 100),
        ("marital_status", data.marital_status.as_deref(), 0, 50),
        ("gender", data.gender.as_deref(), 0, 50),
        ("legal_name", data.legal_name.as_deref(), 0, 250),
        ("trade_name", data.trade_name.as_deref(), 0, 250),
        ("company_type", data.company_type.as_deref(), 0, 100),
        ("taxpayer_type", data.taxpayer_type.as_deref(), 0, 100),
        ("tax_regime", data.tax_regime.as_deref(), 0, 100),
        ("category", data.category.as_deref(), 0, 100),
        ("withholding_agent", data.withholding_agent.as_deref(), 0, 100),
        ("special_taxpayer", data.special_taxpayer.as_deref(), 0, 100),
        (
            "primary_economic_activity",
            data.primary_economic_activity.as_deref(),
            0,
            200,
        ),
        (
            "cancellation_reason",
            data.cancellation_reason.as_deref(),
            0,
            250,
        ),
    ];
    for (field, value, min, max) in limits {
        check_len(field, value, min, max)?;
    }
    Ok(())
}

/// Type/field consistency: companies need a legal name, natural persons a name.
pub fn check_taxpayer_consistency(data: &TaxpayerData) -> Result<(), AppError> {
    let has = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);

    if data.identification_type == crate::models::IdentificationType::Ruc && !has(&data.legal_name) {
        return Err(AppError::Validation("RUC requires legal name".to_string()));
    }
    if data.identification_type.is_natural_person() && !has(&data.full_name) {
        return Err(AppError::Validation(
            "natural person requires name".to_string(),
        ));
    }
    Ok(())
}

/// Tax profile every directly registered taxpayer must carry. Registry
/// snapshots are exempt: the registry is the source of truth for them.
pub fn check_tax_profile(data: &TaxpayerData) -> Result<(), AppError> {
    let required = [
        ("taxpayer_type", data.taxpayer_type.is_some()),
        ("taxpayer_status", data.taxpayer_status.is_some()),
        ("tax_regime", data.tax_regime.is_some()),
        ("accounting_obligation", data.accounting_obligation.is_some()),
        (
            "primary_economic_activity",
            data.primary_economic_activity.is_some(),
        ),
    ];
    match required.iter().find(|(_, present)| !present) {
        Some((field, _)) => Err(AppError::Validation(format!("{} is required", field))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentificationType;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("juan.perez@example.com"));
        assert!(is_valid_email("a+tag@sub.example.ec"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn tax_profile_names_the_missing_field() {
        let mut data = TaxpayerData::new("0501234567", IdentificationType::NationalId);
        data.taxpayer_type = Some("PERSONA NATURAL".into());
        data.taxpayer_status = Some(crate::models::TaxpayerStatus::Activo);
        data.accounting_obligation = Some(crate::models::YesNo::No);
        data.primary_economic_activity = Some("COMERCIO".into());
        let err = check_tax_profile(&data).unwrap_err();
        assert!(err.to_string().contains("tax_regime is required"));

        data.tax_regime = Some("GENERAL".into());
        assert!(check_tax_profile(&data).is_ok());
    }

    #[test]
    fn natural_person_needs_name() {
        let data = TaxpayerData::new("0501234567", IdentificationType::NationalId);
        let err = check_taxpayer_consistency(&data).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: natural person requires name");
    }

    #[test]
    fn company_needs_legal_name() {
        let mut data = TaxpayerData::new("1790012345001", IdentificationType::Ruc);
        assert!(check_taxpayer_consistency(&data).is_err());
        data.legal_name = Some("ACME S.A.".into());
        assert!(check_taxpayer_consistency(&data).is_ok());
    }

    #[test]
    fn other_types_have_no_name_rule() {
        let data = TaxpayerData::new("X123456789", IdentificationType::Other);
        assert!(check_taxpayer_consistency(&data).is_ok());
    }

    #[test]
    fn identification_length_is_bounded() {
        let data = TaxpayerData::new("123", IdentificationType::Other);
        assert!(check_taxpayer_lengths(&data).is_err());
        let data = TaxpayerData::new("1".repeat(26), IdentificationType::Other);
        assert!(check_taxpayer_lengths(&data).is_err());
    }
}
