/// Column-name constants for the IGAC transaction tables.
/// Single source of truth - exported to Python via PyO3.

// ── Source columns (as delivered in the IGAC export) ────────────────────────
pub mod source {
    pub const FECHA_RADICA_TEXTO: &str = "FECHA_RADICA_TEXTO";
    pub const MUNICIPIO: &str = "MUNICIPIO";
    pub const DEPARTAMENTO: &str = "DEPARTAMENTO";
    pub const TIENE_VALOR: &str = "TIENE_VALOR";
    pub const TIPO_PREDIO_ZONA: &str = "TIPO_PREDIO_ZONA";
    pub const VALOR: &str = "VALOR";
    pub const LATITUD: &str = "LATITUD";
    pub const LONGITUD: &str = "LONGITUD";
}

// ── Canonical transaction columns ───────────────────────────────────────────
pub mod transaction {
    pub const TRANSACTION_DATE: &str = "fecha_transaccion";
    pub const MUNICIPALITY_NAME: &str = "nombre_municipio";
    pub const DEPARTMENT_NAME: &str = "nombre_departamento";
    pub const HAS_DECLARED_VALUE_FLAG: &str = "sin_valor_declarado";
    pub const PROPERTY_ZONE_TYPE: &str = "tipo_predio_zona";
    pub const DECLARED_VALUE: &str = "valor_declarado";
    pub const LATITUDE: &str = "latitud";
    pub const LONGITUDE: &str = "longitud";
}

// ── Classification columns ──────────────────────────────────────────────────
pub mod anomaly {
    pub const IS_ANOMALY: &str = "es_anomalia";
    pub const ANOMALY_TYPE: &str = "tipo_anomalia";
}

// ── Anomaly labels ──────────────────────────────────────────────────────────
pub mod label {
    pub const NORMAL: &str = "Normal";
    pub const MISSING_DECLARED_VALUE: &str = "Sin Valor Declarado";
    pub const ZERO_OR_NULL_VALUE: &str = "Valor Cero/Nulo";
    pub const HIGH_RURAL_VALUE: &str = "Valor Alto en Zona Rural";
}

/// Default source → canonical mapping for the IGAC export.
pub const DEFAULT_COLUMN_MAPPING: [(&str, &str); 8] = [
    (source::FECHA_RADICA_TEXTO, transaction::TRANSACTION_DATE),
    (source::MUNICIPIO, transaction::MUNICIPALITY_NAME),
    (source::DEPARTAMENTO, transaction::DEPARTMENT_NAME),
    (source::TIENE_VALOR, transaction::HAS_DECLARED_VALUE_FLAG),
    (source::TIPO_PREDIO_ZONA, transaction::PROPERTY_ZONE_TYPE),
    (source::VALOR, transaction::DECLARED_VALUE),
    (source::LATITUD, transaction::LATITUDE),
    (source::LONGITUD, transaction::LONGITUDE),
];

/// Default location of the transaction export, relative to the working directory.
pub const DEFAULT_DATA_FILE: &str = "data/transacciones_igac.csv";
