//! In-process [`TaxpayerStore`] used by tests and local runs without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Page, Taxpayer, TaxpayerData, TaxpayerFilter};
use crate::taxpayer_store::{TaxpayerStore, UniqueField};

#[derive(Default)]
struct Inner {
    rows: Vec<Taxpayer>,
    next_id: i64,
}

/// Keeps rows in memory and enforces the same live-row unique constraints
/// as the database indexes.
#[derive(Default)]
pub struct MemoryTaxpayerStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryTaxpayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent insert/update fail, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of live rows.
    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .rows
            .iter()
            .filter(|t| t.deleted_at.is_none())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("memory store writes disabled".to_string()));
        }
        Ok(())
    }
}

fn live(rows: &[Taxpayer]) -> impl Iterator<Item = &Taxpayer> {
    rows.iter().filter(|t| t.deleted_at.is_none())
}

fn violated_constraint(rows: &[Taxpayer], data: &TaxpayerData, own_id: Option<i64>) -> Option<UniqueField> {
    UniqueField::ALL.into_iter().find(|field| {
        field.value_of(data).is_some_and(|value| {
            live(rows).any(|t| Some(t.id) != own_id && field.value_of(&t.data) == Some(value))
        })
    })
}

fn contains_ci(haystack: &Option<String>, needle: &Option<String>) -> bool {
    match needle.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        None => true,
        Some(needle) => haystack
            .as_deref()
            .is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase())),
    }
}

fn matches(t: &Taxpayer, f: &TaxpayerFilter) -> bool {
    f.identification_type.map_or(true, |k| t.data.identification_type == k)
        && f.taxpayer_status.map_or(true, |s| t.data.taxpayer_status == Some(s))
        && f
            .accounting_obligation
            .map_or(true, |o| t.data.accounting_obligation == Some(o))
        && contains_ci(&t.data.tax_regime, &f.tax_regime)
        && contains_ci(&t.data.country, &f.country)
        && contains_ci(&t.data.province, &f.province)
        && contains_ci(&t.data.city, &f.city)
}

#[async_trait]
impl TaxpayerStore for MemoryTaxpayerStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Taxpayer>, AppError> {
        let inner = self.inner.read().await;
        let found = live(&inner.rows).find(|t| t.id == id).cloned();
        Ok(found)
    }

    async fn find_by(&self, field: UniqueField, value: &str) -> Result<Option<Taxpayer>, AppError> {
        let inner = self.inner.read().await;
        let found = live(&inner.rows)
            .find(|t| field.value_of(&t.data) == Some(value))
            .cloned();
        Ok(found)
    }

    async fn exists(
        &self,
        field: UniqueField,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        let taken = live(&inner.rows)
            .any(|t| Some(t.id) != exclude_id && field.value_of(&t.data) == Some(value));
        Ok(taken)
    }

    async fn insert(&self, data: &TaxpayerData) -> Result<Taxpayer, AppError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if let Some(field) = violated_constraint(&inner.rows, data, None) {
            return Err(AppError::Conflict(format!(
                "Duplicate value violates unique {}",
                field.column()
            )));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let taxpayer = Taxpayer {
            id: inner.next_id,
            data: data.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.rows.push(taxpayer.clone());
        Ok(taxpayer)
    }

    async fn update(&self, id: i64, data: &TaxpayerData) -> Result<Taxpayer, AppError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if let Some(field) = violated_constraint(&inner.rows, data, Some(id)) {
            return Err(AppError::Conflict(format!(
                "Duplicate value violates unique {}",
                field.column()
            )));
        }
        let row = inner
            .rows
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Taxpayer {} not found", id)))?;
        row.data = data.clone();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        match inner
            .rows
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
        {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &TaxpayerFilter) -> Result<Page<Taxpayer>, AppError> {
        let pagination = filter.pagination();
        let inner = self.inner.read().await;
        let mut hits: Vec<Taxpayer> = live(&inner.rows)
            .filter(|t| matches(t, filter))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.id.cmp(&a.id));
        let total = hits.len() as i64;
        let items = hits
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size() as usize)
            .collect();
        Ok(Page::new(items, total, &pagination))
    }
}
