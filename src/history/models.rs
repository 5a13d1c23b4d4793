//! Persisted scan history rows.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decode::{BackendSource, DecodedSymbol, SymbolFormat};

/// One accepted detection, as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub session_id: Option<String>,
    pub value: String,
    pub format: SymbolFormat,
    pub source: BackendSource,
    pub scanned_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_symbol(symbol: &DecodedSymbol, session_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.map(str::to_string),
            value: symbol.value.clone(),
            format: symbol.format,
            source: symbol.source,
            scanned_at: symbol.detected_at,
        }
    }
}

pub(crate) fn format_as_str(format: SymbolFormat) -> &'static str {
    match format {
        SymbolFormat::Ean13 => "ean13",
        SymbolFormat::Ean8 => "ean8",
        SymbolFormat::UpcA => "upcA",
        SymbolFormat::UpcE => "upcE",
        SymbolFormat::Code128 => "code128",
        SymbolFormat::QrCode => "qrCode",
    }
}

pub(crate) fn parse_format(value: &str) -> Result<SymbolFormat> {
    match value {
        "ean13" => Ok(SymbolFormat::Ean13),
        "ean8" => Ok(SymbolFormat::Ean8),
        "upcA" => Ok(SymbolFormat::UpcA),
        "upcE" => Ok(SymbolFormat::UpcE),
        "code128" => Ok(SymbolFormat::Code128),
        "qrCode" => Ok(SymbolFormat::QrCode),
        other => Err(anyhow!("unknown symbol format {other}")),
    }
}

pub(crate) fn source_as_str(source: BackendSource) -> &'static str {
    match source {
        BackendSource::Native => "native",
        BackendSource::Fallback => "fallback",
    }
}

pub(crate) fn parse_source(value: &str) -> Result<BackendSource> {
    match value {
        "native" => Ok(BackendSource::Native),
        "fallback" => Ok(BackendSource::Fallback),
        other => Err(anyhow!("unknown backend source {other}")),
    }
}

pub(crate) fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}
