use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::errors::{AppError, ResultExt};
use crate::models::{
    IdentificationType, Page, Taxpayer, TaxpayerData, TaxpayerFilter, TaxpayerStatus, YesNo,
};

/// Columns with a uniqueness constraint among live records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    IdentificationNumber,
    Email,
    LegalName,
    TradeName,
}

impl UniqueField {
    pub fn column(self) -> &'static str {
        match self {
            UniqueField::IdentificationNumber => "identification_number",
            UniqueField::Email => "email",
            UniqueField::LegalName => "legal_name",
            UniqueField::TradeName => "trade_name",
        }
    }

    pub fn value_of(self, data: &TaxpayerData) -> Option<&str> {
        match self {
            UniqueField::IdentificationNumber => Some(data.identification_number.as_str()),
            UniqueField::Email => data.email.as_deref(),
            UniqueField::LegalName => data.legal_name.as_deref(),
            UniqueField::TradeName => data.trade_name.as_deref(),
        }
    }

    pub const ALL: [UniqueField; 4] = [
        UniqueField::IdentificationNumber,
        UniqueField::Email,
        UniqueField::LegalName,
        UniqueField::TradeName,
    ];
}

/// Persistence seam for taxpayer records. Every query ignores soft-deleted rows.
#[async_trait]
pub trait TaxpayerStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Taxpayer>, AppError>;

    async fn find_by(&self, field: UniqueField, value: &str) -> Result<Option<Taxpayer>, AppError>;

    /// Whether a live record other than `exclude_id` holds `value` in `field`.
    async fn exists(
        &self,
        field: UniqueField,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, AppError>;

    async fn insert(&self, data: &TaxpayerData) -> Result<Taxpayer, AppError>;

    /// Replaces every writable column of a live record.
    async fn update(&self, id: i64, data: &TaxpayerData) -> Result<Taxpayer, AppError>;

    /// Returns `false` when no live record had that id.
    async fn soft_delete(&self, id: i64) -> Result<bool, AppError>;

    async fn list(&self, filter: &TaxpayerFilter) -> Result<Page<Taxpayer>, AppError>;
}

const WRITABLE_COLUMNS: [&str; 28] = [
    "identification_number",
    "identification_type",
    "email",
    "mobile_phone",
    "landline_phone",
    "address",
    "country",
    "province",
    "city",
    "full_name",
    "birth_date",
    "nationality",
    "marital_status",
    "gender",
    "legal_name",
    "trade_name",
    "company_type",
    "legal_representatives",
    "branches",
    "taxpayer_type",
    "taxpayer_status",
    "tax_regime",
    "category",
    "accounting_obligation",
    "withholding_agent",
    "special_taxpayer",
    "primary_economic_activity",
    "cancellation_reason",
];

/// Raw row; enumerations are stored as their registry codes.
#[derive(Debug, FromRow)]
struct TaxpayerRow {
    id: i64,
    identification_number: String,
    identification_type: String,
    email: Option<String>,
    mobile_phone: Option<String>,
    landline_phone: Option<String>,
    address: Option<String>,
    country: Option<String>,
    province: Option<String>,
    city: Option<String>,
    full_name: Option<String>,
    birth_date: Option<NaiveDate>,
    nationality: Option<String>,
    marital_status: Option<String>,
    gender: Option<String>,
    legal_name: Option<String>,
    trade_name: Option<String>,
    company_type: Option<String>,
    legal_representatives: Option<Value>,
    branches: Option<Value>,
    taxpayer_type: Option<String>,
    taxpayer_status: Option<String>,
    tax_regime: Option<String>,
    category: Option<String>,
    accounting_obligation: Option<String>,
    withholding_agent: Option<String>,
    special_taxpayer: Option<String>,
    primary_economic_activity: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaxpayerRow> for Taxpayer {
    type Error = AppError;

    fn try_from(row: TaxpayerRow) -> Result<Self, Self::Error> {
        let identification_type = IdentificationType::from_code(&row.identification_type)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "taxpayer {} has unknown identification_type '{}'",
                    row.id, row.identification_type
                ))
            })?;

        Ok(Taxpayer {
            id: row.id,
            data: TaxpayerData {
                identification_number: row.identification_number,
                identification_type,
                email: row.email,
                mobile_phone: row.mobile_phone,
                landline_phone: row.landline_phone,
                address: row.address,
                country: row.country,
                province: row.province,
                city: row.city,
                full_name: row.full_name,
                birth_date: row.birth_date,
                nationality: row.nationality,
                marital_status: row.marital_status,
                gender: row.gender,
                legal_name: row.legal_name,
                trade_name: row.trade_name,
                company_type: row.company_type,
                legal_representatives: row.legal_representatives,
                branches: row.branches,
                taxpayer_type: row.taxpayer_type,
                taxpayer_status: row
                    .taxpayer_status
                    .as_deref()
                    .and_then(TaxpayerStatus::from_code),
                tax_regime: row.tax_regime,
                category: row.category,
                accounting_obligation: row
                    .accounting_obligation
                    .as_deref()
                    .and_then(YesNo::from_code),
                withholding_agent: row.withholding_agent,
                special_taxpayer: row.special_taxpayer,
                primary_economic_activity: row.primary_economic_activity,
                cancellation_reason: row.cancellation_reason,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Pushes the writable columns as binds, in `WRITABLE_COLUMNS` order.
fn push_values(separated: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>, data: &TaxpayerData) {
    separated
        .push_bind(data.identification_number.clone())
        .push_bind(data.identification_type.code())
        .push_bind(data.email.clone())
        .push_bind(data.mobile_phone.clone())
        .push_bind(data.landline_phone.clone())
        .push_bind(data.address.clone())
        .push_bind(data.country.clone())
        .push_bind(data.province.clone())
        .push_bind(data.city.clone())
        .push_bind(data.full_name.clone())
        .push_bind(data.birth_date)
        .push_bind(data.nationality.clone())
        .push_bind(data.marital_status.clone())
        .push_bind(data.gender.clone())
        .push_bind(data.legal_name.clone())
        .push_bind(data.trade_name.clone())
        .push_bind(data.company_type.clone())
        .push_bind(data.legal_representatives.clone())
        .push_bind(data.branches.clone())
        .push_bind(data.taxpayer_type.clone())
        .push_bind(data.taxpayer_status.map(TaxpayerStatus::code))
        .push_bind(data.tax_regime.clone())
        .push_bind(data.category.clone())
        .push_bind(data.accounting_obligation.map(YesNo::code))
        .push_bind(data.withholding_agent.clone())
        .push_bind(data.special_taxpayer.clone())
        .push_bind(data.primary_economic_activity.clone())
        .push_bind(data.cancellation_reason.clone());
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TaxpayerFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(kind) = filter.identification_type {
        qb.push(" AND identification_type = ").push_bind(kind.code());
    }
    if let Some(status) = filter.taxpayer_status {
        qb.push(" AND taxpayer_status = ").push_bind(status.code());
    }
    if let Some(flag) = filter.accounting_obligation {
        qb.push(" AND accounting_obligation = ").push_bind(flag.code());
    }
    let substring_filters = [
        ("tax_regime", &filter.tax_regime),
        ("country", &filter.country),
        ("province", &filter.province),
        ("city", &filter.city),
    ];
    for (column, value) in substring_filters {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            qb.push(format!(" AND {} ILIKE ", column))
                .push_bind(like_pattern(value.trim()));
        }
    }
}

/// PostgreSQL-backed [`TaxpayerStore`].
#[derive(Clone)]
pub struct PgTaxpayerStore {
    pool: PgPool,
}

impl PgTaxpayerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Taxpayer>, AppError> {
        let sql = format!(
            "SELECT * FROM taxpayers WHERE {} = $1 AND deleted_at IS NULL LIMIT 1",
            column
        );
        let row = sqlx::query_as::<_, TaxpayerRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to look up taxpayer by {}", column))?;
        row.map(Taxpayer::try_from).transpose()
    }
}

#[async_trait]
impl TaxpayerStore for PgTaxpayerStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Taxpayer>, AppError> {
        let row = sqlx::query_as::<_, TaxpayerRow>(
            "SELECT * FROM taxpayers WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load taxpayer")?;
        row.map(Taxpayer::try_from).transpose()
    }

    async fn find_by(&self, field: UniqueField, value: &str) -> Result<Option<Taxpayer>, AppError> {
        self.fetch_one_by(field.column(), value).await
    }

    async fn exists(
        &self,
        field: UniqueField,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, AppError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM taxpayers WHERE {} = $1 AND deleted_at IS NULL \
             AND ($2::BIGINT IS NULL OR id <> $2))",
            field.column()
        );
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(value)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to check {} uniqueness", field.column()))?;
        Ok(exists)
    }

    async fn insert(&self, data: &TaxpayerData) -> Result<Taxpayer, AppError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO taxpayers (");
        qb.push(WRITABLE_COLUMNS.join(", "));
        qb.push(") VALUES (");
        {
            let mut separated = qb.separated(", ");
            push_values(&mut separated, data);
        }
        qb.push(") RETURNING *");

        let row = qb
            .build_query_as::<TaxpayerRow>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert taxpayer")?;

        tracing::debug!("Inserted taxpayer {} ({})", row.id, row.identification_number);
        Taxpayer::try_from(row)
    }

    async fn update(&self, id: i64, data: &TaxpayerData) -> Result<Taxpayer, AppError> {
        // ROW(...) assignment keeps the bind order identical to inserts
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE taxpayers SET (");
        qb.push(WRITABLE_COLUMNS.join(", "));
        qb.push(") = ROW(");
        {
            let mut separated = qb.separated(", ");
            push_values(&mut separated, data);
        }
        qb.push("), updated_at = NOW() WHERE deleted_at IS NULL AND id = ");
        qb.push_bind(id);
        qb.push(" RETURNING *");

        let row = qb
            .build_query_as::<TaxpayerRow>()
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update taxpayer")?
            .ok_or_else(|| AppError::NotFound(format!("Taxpayer {} not found", id)))?;

        Taxpayer::try_from(row)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE taxpayers SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to delete taxpayer")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &TaxpayerFilter) -> Result<Page<Taxpayer>, AppError> {
        let pagination = filter.pagination();

        let mut count_qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM taxpayers");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count taxpayers")?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM taxpayers");
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(pagination.page_size())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let rows = qb
            .build_query_as::<TaxpayerRow>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list taxpayers")?;

        let items = rows
            .into_iter()
            .map(Taxpayer::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total, &pagination))
    }
}
