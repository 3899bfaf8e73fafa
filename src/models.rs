use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::AppError;

// ============ Shared building blocks ============

/// Three-state value for PATCH payloads.
///
/// A field missing from the JSON body deserializes to `Unchanged` (via
/// `#[serde(default)]`), an explicit `null` to `Clear`, and anything else to
/// `Set`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for FieldPatch<T> {
    fn default() -> Self {
        FieldPatch::Unchanged
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldPatch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => FieldPatch::Set(value),
            None => FieldPatch::Clear,
        })
    }
}

impl<T> FieldPatch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldPatch::Unchanged)
    }

    /// Applies the patch to a nullable slot.
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            FieldPatch::Unchanged => {}
            FieldPatch::Clear => *slot = None,
            FieldPatch::Set(value) => *slot = Some(value),
        }
    }

    /// Applies the patch to a required slot; `null` is rejected.
    pub fn apply_required(self, slot: &mut T, field: &str) -> Result<(), AppError> {
        match self {
            FieldPatch::Unchanged => Ok(()),
            FieldPatch::Clear => Err(AppError::Validation(format!("{} cannot be null", field))),
            FieldPatch::Set(value) => {
                *slot = value;
                Ok(())
            }
        }
    }

    /// Like [`FieldPatch::apply_to`] for fields that are nullable in storage
    /// but may not be cleared through the API.
    pub fn apply_present(self, slot: &mut Option<T>, field: &str) -> Result<(), AppError> {
        match self {
            FieldPatch::Unchanged => Ok(()),
            FieldPatch::Clear => Err(AppError::Validation(format!("{} cannot be null", field))),
            FieldPatch::Set(value) => {
                *slot = Some(value);
                Ok(())
            }
        }
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// `page` / `page_size` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl Pagination {
    /// Page number, at least 1.
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    /// Page size, defaulting to 10 and clamped to `1..=100`.
    pub fn page_size(&self) -> i64 {
        match self.page_size {
            Some(size) if size >= 1 => size.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows to skip. Saturates for absurd page numbers, which then read
    /// past the end and return an empty page.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

/// One page of results plus the totals clients need to paginate.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        let page_size = pagination.page_size();
        Self {
            items,
            total,
            page: pagination.page(),
            page_size,
            total_pages: (total + page_size - 1) / page_size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

/// Result of the `check/*` availability endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub field: &'static str,
    pub value: String,
    pub available: bool,
}

// ============ Taxpayer enumerations ============

/// Tax-authority identification type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationType {
    /// Company tax ID.
    #[serde(rename = "04")]
    Ruc,
    /// National ID card.
    #[serde(rename = "05")]
    NationalId,
    #[serde(rename = "06")]
    Passport,
    #[serde(rename = "07")]
    Other,
}

impl IdentificationType {
    pub fn code(self) -> &'static str {
        match self {
            IdentificationType::Ruc => "04",
            IdentificationType::NationalId => "05",
            IdentificationType::Passport => "06",
            IdentificationType::Other => "07",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "04" => Some(IdentificationType::Ruc),
            "05" => Some(IdentificationType::NationalId),
            "06" => Some(IdentificationType::Passport),
            "07" => Some(IdentificationType::Other),
            _ => None,
        }
    }

    /// National ID and passport holders are natural persons.
    pub fn is_natural_person(self) -> bool {
        matches!(
            self,
            IdentificationType::NationalId | IdentificationType::Passport
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaxpayerStatus {
    Activo,
    Suspendido,
    Cancelado,
}

impl TaxpayerStatus {
    pub fn code(self) -> &'static str {
        match self {
            TaxpayerStatus::Activo => "ACTIVO",
            TaxpayerStatus::Suspendido => "SUSPENDIDO",
            TaxpayerStatus::Cancelado => "CANCELADO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "ACTIVO" => Some(TaxpayerStatus::Activo),
            "SUSPENDIDO" => Some(TaxpayerStatus::Suspendido),
            "CANCELADO" => Some(TaxpayerStatus::Cancelado),
            _ => None,
        }
    }
}

/// Accounting obligation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YesNo {
    #[serde(rename = "SI")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl YesNo {
    pub fn code(self) -> &'static str {
        match self {
            YesNo::Yes => "SI",
            YesNo::No => "NO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "SI" | "SÍ" => Some(YesNo::Yes),
            "NO" => Some(YesNo::No),
            _ => None,
        }
    }
}

// ============ Taxpayer record ============

/// Every writable field of a taxpayer record.
///
/// Reconciliation overwrites this whole struct; direct registration and
/// patches build it field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxpayerData {
    pub identification_number: String,
    pub identification_type: IdentificationType,

    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub landline_phone: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,

    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub marital_status: Option<String>,
    pub gender: Option<String>,

    pub legal_name: Option<String>,
    pub trade_name: Option<String>,
    pub company_type: Option<String>,
    /// Opaque JSON as received from the registry.
    pub legal_representatives: Option<Value>,
    /// Opaque JSON as received from the registry.
    pub branches: Option<Value>,

    pub taxpayer_type: Option<String>,
    pub taxpayer_status: Option<TaxpayerStatus>,
    pub tax_regime: Option<String>,
    pub category: Option<String>,
    pub accounting_obligation: Option<YesNo>,
    pub withholding_agent: Option<String>,
    pub special_taxpayer: Option<String>,
    pub primary_economic_activity: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl TaxpayerData {
    /// An otherwise empty record for the given identity.
    pub fn new(identification_number: impl Into<String>, kind: IdentificationType) -> Self {
        Self {
            identification_number: identification_number.into(),
            identification_type: kind,
            email: None,
            mobile_phone: None,
            landline_phone: None,
            address: None,
            country: None,
            province: None,
            city: None,
            full_name: None,
            birth_date: None,
            nationality: None,
            marital_status: None,
            gender: None,
            legal_name: None,
            trade_name: None,
            company_type: None,
            legal_representatives: None,
            branches: None,
            taxpayer_type: None,
            taxpayer_status: None,
            tax_regime: None,
            category: None,
            accounting_obligation: None,
            withholding_agent: None,
            special_taxpayer: None,
            primary_economic_activity: None,
            cancellation_reason: None,
        }
    }
}

/// Stored taxpayer: writable data plus identity and audit columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Taxpayer {
    pub id: i64,
    #[serde(flatten)]
    pub data: TaxpayerData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Whole years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<i32> {
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    Some(years)
}

/// API view of a taxpayer with the computed age.
#[derive(Debug, Clone, Serialize)]
pub struct TaxpayerResponse {
    #[serde(flatten)]
    pub taxpayer: Taxpayer,
    pub age: Option<i32>,
}

impl From<Taxpayer> for TaxpayerResponse {
    fn from(taxpayer: Taxpayer) -> Self {
        let today = Utc::now().date_naive();
        let age = taxpayer.data.birth_date.and_then(|b| age_on(b, today));
        Self { taxpayer, age }
    }
}

/// Body of `POST /citizens`. Also accepts the legacy snake-case Spanish keys.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaxpayerRequest {
    #[serde(alias = "numero_identificacion")]
    pub identification_number: String,
    #[serde(alias = "tipo_identificacion")]
    pub identification_type: IdentificationType,
    pub email: String,
    #[serde(alias = "celular")]
    pub mobile_phone: Option<String>,
    #[serde(alias = "convencional")]
    pub landline_phone: Option<String>,
    #[serde(alias = "direccion_principal")]
    pub address: Option<String>,
    #[serde(alias = "pais")]
    pub country: Option<String>,
    #[serde(alias = "provincia")]
    pub province: Option<String>,
    #[serde(alias = "ciudad")]
    pub city: Option<String>,
    #[serde(alias = "nombre")]
    pub full_name: Option<String>,
    #[serde(alias = "fecha_nacimiento")]
    pub birth_date: Option<NaiveDate>,
    #[serde(alias = "nacionalidad")]
    pub nationality: Option<String>,
    #[serde(alias = "estado_civil")]
    pub marital_status: Option<String>,
    #[serde(alias = "genero")]
    pub gender: Option<String>,
    #[serde(alias = "razon_social")]
    pub legal_name: Option<String>,
    #[serde(alias = "nombre_comercial")]
    pub trade_name: Option<String>,
    #[serde(alias = "tipo_empresa")]
    pub company_type: Option<String>,
    #[serde(alias = "representantes_legales")]
    pub legal_representatives: Option<Value>,
    #[serde(alias = "sucursales")]
    pub branches: Option<Value>,
    // Tax profile: required on direct registration
    #[serde(alias = "tipo_contribuyente")]
    pub taxpayer_type: String,
    #[serde(alias = "estado_contribuyente")]
    pub taxpayer_status: TaxpayerStatus,
    #[serde(alias = "regimen")]
    pub tax_regime: String,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
    #[serde(alias = "obligado_contabilidad")]
    pub accounting_obligation: YesNo,
    #[serde(alias = "agente_retencion")]
    pub withholding_agent: Option<String>,
    #[serde(alias = "contribuyente_especial")]
    pub special_taxpayer: Option<String>,
    #[serde(alias = "actividad_economica_principal")]
    pub primary_economic_activity: String,
    #[serde(alias = "motivo_cancelacion_suspension")]
    pub cancellation_reason: Option<String>,
}

impl From<CreateTaxpayerRequest> for TaxpayerData {
    fn from(req: CreateTaxpayerRequest) -> Self {
        Self {
            identification_number: req.identification_number,
            identification_type: req.identification_type,
            email: Some(req.email),
            mobile_phone: req.mobile_phone,
            landline_phone: req.landline_phone,
            address: req.address,
            country: req.country,
            province: req.province,
            city: req.city,
            full_name: req.full_name,
            birth_date: req.birth_date,
            nationality: req.nationality,
            marital_status: req.marital_status,
            gender: req.gender,
            legal_name: req.legal_name,
            trade_name: req.trade_name,
            company_type: req.company_type,
            legal_representatives: req.legal_representatives,
            branches: req.branches,
            taxpayer_type: Some(req.taxpayer_type),
            taxpayer_status: Some(req.taxpayer_status),
            tax_regime: Some(req.tax_regime),
            category: req.category,
            accounting_obligation: Some(req.accounting_obligation),
            withholding_agent: req.withholding_agent,
            special_taxpayer: req.special_taxpayer,
            primary_economic_activity: Some(req.primary_economic_activity),
            cancellation_reason: req.cancellation_reason,
        }
    }
}

/// Body of `PUT`/`PATCH /citizens/:id`. Only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaxpayerPatch {
    #[serde(alias = "numero_identificacion")]
    pub identification_number: FieldPatch<String>,
    #[serde(alias = "tipo_identificacion")]
    pub identification_type: FieldPatch<IdentificationType>,
    pub email: FieldPatch<String>,
    #[serde(alias = "celular")]
    pub mobile_phone: FieldPatch<String>,
    #[serde(alias = "convencional")]
    pub landline_phone: FieldPatch<String>,
    #[serde(alias = "direccion_principal")]
    pub address: FieldPatch<String>,
    #[serde(alias = "pais")]
    pub country: FieldPatch<String>,
    #[serde(alias = "provincia")]
    pub province: FieldPatch<String>,
    #[serde(alias = "ciudad")]
    pub city: FieldPatch<String>,
    #[serde(alias = "nombre")]
    pub full_name: FieldPatch<String>,
    #[serde(alias = "fecha_nacimiento")]
    pub birth_date: FieldPatch<NaiveDate>,
    #[serde(alias = "nacionalidad")]
    pub nationality: FieldPatch<String>,
    #[serde(alias = "estado_civil")]
    pub marital_status: FieldPatch<String>,
    #[serde(alias = "genero")]
    pub gender: FieldPatch<String>,
    #[serde(alias = "razon_social")]
    pub legal_name: FieldPatch<String>,
    #[serde(alias = "nombre_comercial")]
    pub trade_name: FieldPatch<String>,
    #[serde(alias = "tipo_empresa")]
    pub company_type: FieldPatch<String>,
    #[serde(alias = "representantes_legales")]
    pub legal_representatives: FieldPatch<Value>,
    #[serde(alias = "sucursales")]
    pub branches: FieldPatch<Value>,
    #[serde(alias = "tipo_contribuyente")]
    pub taxpayer_type: FieldPatch<String>,
    #[serde(alias = "estado_contribuyente")]
    pub taxpayer_status: FieldPatch<TaxpayerStatus>,
    #[serde(alias = "regimen")]
    pub tax_regime: FieldPatch<String>,
    #[serde(alias = "categoria")]
    pub category: FieldPatch<String>,
    #[serde(alias = "obligado_contabilidad")]
    pub accounting_obligation: FieldPatch<YesNo>,
    #[serde(alias = "agente_retencion")]
    pub withholding_agent: FieldPatch<String>,
    #[serde(alias = "contribuyente_especial")]
    pub special_taxpayer: FieldPatch<String>,
    #[serde(alias = "actividad_economica_principal")]
    pub primary_economic_activity: FieldPatch<String>,
    #[serde(alias = "motivo_cancelacion_suspension")]
    pub cancellation_reason: FieldPatch<String>,
}

impl TaxpayerPatch {
    /// Writes every present field into `data`.
    pub fn apply(self, data: &mut TaxpayerData) -> Result<(), AppError> {
        self.identification_number
            .apply_required(&mut data.identification_number, "identification_number")?;
        self.identification_type
            .apply_required(&mut data.identification_type, "identification_type")?;
        self.email.apply_present(&mut data.email, "email")?;
        self.mobile_phone.apply_to(&mut data.mobile_phone);
        self.landline_phone.apply_to(&mut data.landline_phone);
        self.address.apply_to(&mut data.address);
        self.country.apply_to(&mut data.country);
        self.province.apply_to(&mut data.province);
        self.city.apply_to(&mut data.city);
        self.full_name.apply_to(&mut data.full_name);
        self.birth_date.apply_to(&mut data.birth_date);
        self.nationality.apply_to(&mut data.nationality);
        self.marital_status.apply_to(&mut data.marital_status);
        self.gender.apply_to(&mut data.gender);
        self.legal_name.apply_to(&mut data.legal_name);
        self.trade_name.apply_to(&mut data.trade_name);
        self.company_type.apply_to(&mut data.company_type);
        self.legal_representatives
            .apply_to(&mut data.legal_representatives);
        self.branches.apply_to(&mut data.branches);
        self.taxpayer_type.apply_to(&mut data.taxpayer_type);
        self.taxpayer_status.apply_to(&mut data.taxpayer_status);
        self.tax_regime.apply_to(&mut data.tax_regime);
        self.category.apply_to(&mut data.category);
        self.accounting_obligation
            .apply_to(&mut data.accounting_obligation);
        self.withholding_agent.apply_to(&mut data.withholding_agent);
        self.special_taxpayer.apply_to(&mut data.special_taxpayer);
        self.primary_economic_activity
            .apply_to(&mut data.primary_economic_activity);
        self.cancellation_reason
            .apply_to(&mut data.cancellation_reason);
        Ok(())
    }
}

/// Query parameters of `GET /citizens`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxpayerFilter {
    pub identification_type: Option<IdentificationType>,
    pub taxpayer_status: Option<TaxpayerStatus>,
    pub accounting_obligation: Option<YesNo>,
    pub tax_regime: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl TaxpayerFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

// ============ Reconciliation wire types ============

/// Body of `POST /consult`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsultRequest {
    #[serde(rename = "numeroIdentificacion", alias = "identificationNumber")]
    pub identification_number: String,
    #[serde(default)]
    pub token: String,
}

/// Result returned for identifications that fail the shape check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidIdentification {
    #[serde(rename = "numeroIdentificacion")]
    pub identification_number: String,
    /// Always `"invalid"`.
    pub status: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_absent_null_and_value() {
        let patch: TaxpayerPatch =
            serde_json::from_value(serde_json::json!({"city": null, "province": "Pichincha"}))
                .unwrap();
        assert_eq!(patch.city, FieldPatch::Clear);
        assert_eq!(patch.province, FieldPatch::Set("Pichincha".to_string()));
        assert!(patch.country.is_unchanged());
    }

    #[test]
    fn patch_rejects_null_on_required_field() {
        let mut data = TaxpayerData::new("0501234567", IdentificationType::NationalId);
        let patch: TaxpayerPatch =
            serde_json::from_value(serde_json::json!({"identification_number": null})).unwrap();
        assert!(patch.apply(&mut data).is_err());
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        let p = Pagination::default();
        assert_eq!((p.page(), p.page_size(), p.offset()), (1, 10, 0));

        let p = Pagination {
            page: Some(0),
            page_size: Some(1000),
        };
        assert_eq!((p.page(), p.page_size()), (1, 100));

        let p = Pagination {
            page: Some(3),
            page_size: Some(0),
        };
        assert_eq!((p.page(), p.page_size(), p.offset()), (3, 10, 20));
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let p = Pagination {
            page: Some(i64::MAX),
            page_size: Some(100),
        };
        assert_eq!(p.offset(), i64::MAX);

        let p = Pagination {
            page: Some(i64::MAX / 10 + 1),
            page_size: None,
        };
        assert!(p.offset() >= 0);
    }

    #[test]
    fn create_request_requires_tax_profile_and_accepts_legacy_keys() {
        let body = serde_json::json!({
            "numero_identificacion": "0501234567",
            "tipo_identificacion": "05",
            "email": "juan@example.com",
            "nombre": "Juan Perez",
            "tipo_contribuyente": "PERSONA NATURAL",
            "estado_contribuyente": "ACTIVO",
            "regimen": "GENERAL",
            "obligado_contabilidad": "NO",
            "actividad_economica_principal": "COMERCIO",
        });
        let req: CreateTaxpayerRequest = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(req.full_name.as_deref(), Some("Juan Perez"));
        assert_eq!(req.taxpayer_status, TaxpayerStatus::Activo);

        let mut missing = body;
        missing.as_object_mut().unwrap().remove("regimen");
        assert!(serde_json::from_value::<CreateTaxpayerRequest>(missing).is_err());
    }

    #[test]
    fn page_counts_partial_last_page() {
        let page = Page::new(vec![1, 2, 3], 21, &Pagination::default());
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn age_counts_whole_years() {
        let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()), Some(33));
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), Some(34));
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(1989, 1, 1).unwrap()), None);
    }

    #[test]
    fn enums_use_registry_codes() {
        assert_eq!(serde_json::to_value(IdentificationType::Ruc).unwrap(), "04");
        assert_eq!(serde_json::to_value(TaxpayerStatus::Suspendido).unwrap(), "SUSPENDIDO");
        assert_eq!(serde_json::to_value(YesNo::Yes).unwrap(), "SI");
        assert_eq!(TaxpayerStatus::from_code("activo"), Some(TaxpayerStatus::Activo));
    }

    #[test]
    fn consult_request_accepts_both_spellings() {
        let a: ConsultRequest =
            serde_json::from_value(serde_json::json!({"numeroIdentificacion": "1", "token": "t"}))
                .unwrap();
        let b: ConsultRequest =
            serde_json::from_value(serde_json::json!({"identificationNumber": "1"})).unwrap();
        assert_eq!(a.identification_number, b.identification_number);
        assert!(b.token.is_empty());
    }
}
