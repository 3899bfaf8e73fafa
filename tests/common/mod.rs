#![allow(dead_code)]

use serde_json::{json, Value};
use taxpayer_registry_api::config::Config;

pub const TEST_JWT_SECRET: &str = "test-secret-test-secret-test-secret!";

/// Helper function to create test config
pub fn create_test_config(registry_api_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        db_max_connections: 1,
        port: 8080,
        registry_api_url,
        registry_api_key: "test_api_key".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        access_token_ttl_minutes: 15,
        refresh_token_ttl_days: 7,
        front_url: None,
        default_role: "user".to_string(),
        cookie_secure: false,
    }
}

/// National-ID registry document as the registry returns it.
pub fn cedula_document(cedula: &str) -> Value {
    json!({
        "resultado": {
            "Cedula": cedula,
            "NombreCiudadano": "JUAN PEREZ",
            "Sexo": "HOMBRE",
            "EstadoCivil": "SOLTERO",
            "FechaNacimiento": "15/06/1990",
            "Nacionalidad": "ECUATORIANA",
            "Domicilio": "AV. AMAZONAS N34-120",
            "Email": "juan.perez@example.com",
            "Celular": "0991234567",
            "Convencional": "",
            "DPA_DireccionContribuyente": {
                "Provincia": "PICHINCHA",
                "Canton": "QUITO"
            },
            "EstadoContribuyente": "ACTIVO",
            "ObligadoContabilidad": "NO"
        }
    })
}

/// Company registry document.
pub fn ruc_document(ruc: &str) -> Value {
    json!({
        "resultado": {
            "NumeroRuc": ruc,
            "RazonSocial": "COMERCIAL ANDINA S.A.",
            "NombreComercial": "ANDINA",
            "DireccionContribuyente": "CALLE 10 DE AGOSTO",
            "TipoContribuyente": "SOCIEDAD",
            "Regimen": "GENERAL",
            "Categoria": "MEDIANA",
            "ObligadoContabilidad": "SI",
            "AgenteRetencion": "SI",
            "ContribuyenteEspecial": "",
            "ActividadEconomicaPrincipal": "VENTA AL POR MAYOR",
            "RepresentantesLegales": [
                {"Identificacion": "0102030405", "Nombre": "MARIA LOPEZ"}
            ],
            "Sucursales": [
                {"Numero": "001", "Estado": "ABIERTO"},
                {"Numero": "002", "Estado": "CERRADO"}
            ],
            "EstadoContribuyente": "SUSPENDIDO",
            "MotivoCancelacionSuspension": "A PETICION DEL CONTRIBUYENTE"
        }
    })
}
