//! Taxpayer Registry API Library
//!
//! CRUD for taxpayers (citizens and companies), tenant companies, users and
//! roles behind JWT auth, plus reconciliation against the external tax
//! registry.
//!
//! # Modules
//!
//! - `account_handlers`: Auth, user, role and company HTTP handlers.
//! - `account_models`: User, role, company and auth payloads.
//! - `account_services`: User, role and company services.
//! - `auth`: JWT issuance/validation, password hashing, auth middleware.
//! - `config`: Configuration management.
//! - `db`: Database pool and migrations.
//! - `errors`: Error handling types.
//! - `handlers`: Application state, envelopes and taxpayer/consult handlers.
//! - `memory_store`: In-memory taxpayer store.
//! - `models`: Taxpayer models and shared request types.
//! - `reconciliation`: Registry consult and upsert.
//! - `registry_client`: External registry HTTP client.
//! - `registry_models`: Registry response schema and key aliases.
//! - `routes`: Router assembly.
//! - `services`: Taxpayer service.
//! - `taxpayer_store`: Taxpayer store trait and PostgreSQL implementation.
//! - `validation`: Field validation helpers.

pub mod account_handlers;
pub mod account_models;
pub mod account_services;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod memory_store;
pub mod models;
pub mod reconciliation;
pub mod registry_client;
pub mod registry_models;
pub mod routes;
pub mod services;
pub mod taxpayer_store;
pub mod validation;
