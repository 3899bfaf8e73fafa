//! Declared shape of the external tax registry's lookup response.
//!
//! The registry answers with `{"resultado": {...}}`. Field names inside
//! `resultado` are not fully stable across its national-ID and company
//! endpoints, so each logical field is resolved through [`FIELD_ALIASES`]:
//! the primary key first, then the accepted aliases in order.

use serde_json::{Map, Value};

use crate::errors::AppError;

/// Bump when the alias table changes in an incompatible way.
pub const SCHEMA_VERSION: u32 = 1;

/// Top-level key holding the record.
pub const RESULT_KEY: &str = "resultado";

/// Nested object holding the political-administrative division of the address.
pub const DIVISION_KEY: &str = "DPA_DireccionContribuyente";

/// Logical fields read from a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryField {
    IdentificationNumber,
    Email,
    MobilePhone,
    LandlinePhone,
    Address,
    Province,
    City,
    TaxpayerType,
    TaxpayerStatus,
    TaxRegime,
    Category,
    AccountingObligation,
    WithholdingAgent,
    SpecialTaxpayer,
    PrimaryEconomicActivity,
    CancellationReason,
    LegalName,
    TradeName,
    LegalRepresentatives,
    Branches,
    FullName,
    Gender,
    MaritalStatus,
    BirthDate,
    Nationality,
}

impl RegistryField {
    pub const ALL: [RegistryField; 25] = [
        RegistryField::IdentificationNumber,
        RegistryField::Email,
        RegistryField::MobilePhone,
        RegistryField::LandlinePhone,
        RegistryField::Address,
        RegistryField::Province,
        RegistryField::City,
        RegistryField::TaxpayerType,
        RegistryField::TaxpayerStatus,
        RegistryField::TaxRegime,
        RegistryField::Category,
        RegistryField::AccountingObligation,
        RegistryField::WithholdingAgent,
        RegistryField::SpecialTaxpayer,
        RegistryField::PrimaryEconomicActivity,
        RegistryField::CancellationReason,
        RegistryField::LegalName,
        RegistryField::TradeName,
        RegistryField::LegalRepresentatives,
        RegistryField::Branches,
        RegistryField::FullName,
        RegistryField::Gender,
        RegistryField::MaritalStatus,
        RegistryField::BirthDate,
        RegistryField::Nationality,
    ];
}

/// Compatibility table: logical field, then registry keys in lookup order.
pub const FIELD_ALIASES: &[(RegistryField, &[&str])] = &[
    (RegistryField::IdentificationNumber, &["NumeroRuc", "Cedula"]),
    (RegistryField::Email, &["Email"]),
    (RegistryField::MobilePhone, &["Celular"]),
    (RegistryField::LandlinePhone, &["Convencional"]),
    (RegistryField::Address, &["DireccionContribuyente", "Domicilio"]),
    (RegistryField::Province, &["Provincia"]),
    (RegistryField::City, &["Canton"]),
    (RegistryField::TaxpayerType, &["TipoContribuyente"]),
    (RegistryField::TaxpayerStatus, &["EstadoContribuyente"]),
    (RegistryField::TaxRegime, &["Regimen"]),
    (RegistryField::Category, &["Categoria"]),
    (RegistryField::AccountingObligation, &["ObligadoContabilidad"]),
    (RegistryField::WithholdingAgent, &["AgenteRetencion"]),
    (RegistryField::SpecialTaxpayer, &["ContribuyenteEspecial"]),
    (
        RegistryField::PrimaryEconomicActivity,
        &["ActividadEconomicaPrincipal"],
    ),
    (
        RegistryField::CancellationReason,
        &["MotivoCancelacionSuspension"],
    ),
    (RegistryField::LegalName, &["RazonSocial"]),
    (RegistryField::TradeName, &["NombreComercial"]),
    (RegistryField::LegalRepresentatives, &["RepresentantesLegales"]),
    (RegistryField::Branches, &["Sucursales"]),
    (RegistryField::FullName, &["NombreCiudadano"]),
    (RegistryField::Gender, &["Sexo"]),
    (RegistryField::MaritalStatus, &["EstadoCivil"]),
    (RegistryField::BirthDate, &["FechaNacimiento"]),
    (RegistryField::Nationality, &["Nacionalidad"]),
];

fn keys_for(field: RegistryField) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

/// Borrowed view over the `resultado` object of a registry document.
#[derive(Debug, Clone, Copy)]
pub struct RegistryRecord<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RegistryRecord<'a> {
    /// Validates the document shape: `resultado` must exist and be an object.
    pub fn from_document(document: &'a Value) -> Result<Self, AppError> {
        match document.get(RESULT_KEY) {
            Some(Value::Object(fields)) => Ok(Self { fields }),
            Some(other) => Err(AppError::MalformedResponse(format!(
                "'{}' is not an object (got {})",
                RESULT_KEY,
                json_type(other)
            ))),
            None => Err(AppError::MalformedResponse(format!(
                "missing '{}' in registry document",
                RESULT_KEY
            ))),
        }
    }

    /// Raw value of the first alias present and non-null.
    pub fn raw(&self, field: RegistryField) -> Option<&'a Value> {
        keys_for(field)
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|value| !value.is_null())
    }

    /// Text value of a field; empty strings read as absent.
    pub fn text(&self, field: RegistryField) -> Option<String> {
        keys_for(field)
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(text_of)
    }

    /// Text value read from the nested address-division object.
    pub fn division_text(&self, field: RegistryField) -> Option<String> {
        let division = self.fields.get(DIVISION_KEY)?.as_object()?;
        keys_for(field)
            .iter()
            .filter_map(|key| division.get(*key))
            .find_map(text_of)
    }
}

/// Strings are trimmed; numbers are rendered; everything else is absent.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
