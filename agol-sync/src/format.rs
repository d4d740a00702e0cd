//! Normalisation des lignes CSV selon le schéma cible
//!
//! La coercition est volontairement souple: une valeur qui ne se convertit
//! pas dans le type du champ est conservée telle quelle (texte), et c'est le
//! service qui tranche ligne par ligne.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::trace;

use crate::error::SyncError;
use crate::geometry::GeometryCodec;
use crate::record::{FieldValue, NormalizedRecord};
use crate::schema::{FieldType, TargetSchema};
use crate::source::SourceRow;

/// Formats date + heure, essayés dans l'ordre (heure naïve = UTC)
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Formats date seule; les années sur deux chiffres passent avant `%Y`
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%Y%m%d",
];

/// Parse une date dans l'un des formats courants
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ndt.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }

    None
}

fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(i);
    }
    let f = text.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Retire les caractères non ASCII et `' " < >`
pub fn clean(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii() && !matches!(c, '\'' | '"' | '<' | '>'))
        .collect()
}

/// Convertit une cellule selon le type du champ cible
pub fn coerce(raw: &str, field_type: Option<FieldType>) -> FieldValue {
    if raw.trim().is_empty() {
        return FieldValue::Null;
    }

    let coerced = match field_type {
        Some(FieldType::Date) => parse_date(raw).map(FieldValue::Timestamp),
        Some(FieldType::Integer) => parse_integer(raw).map(FieldValue::Integer),
        Some(FieldType::Numeric) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(FieldValue::Number),
        Some(FieldType::Boolean) => parse_bool(raw).map(FieldValue::Bool),
        Some(FieldType::Text) | Some(FieldType::Geometry) | None => None,
    };

    coerced.unwrap_or_else(|| FieldValue::Text(raw.to_string()))
}

/// Formateur de lignes pour un run
pub struct RowFormatter<'a> {
    schema: &'a TargetSchema,
    clean_columns: HashSet<String>,
}

impl<'a> RowFormatter<'a> {
    pub fn new(schema: &'a TargetSchema, clean_columns: &[String]) -> Self {
        Self {
            schema,
            clean_columns: clean_columns
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
        }
    }

    /// Normalise une ligne source
    ///
    /// # Errors
    /// Erreurs de géométrie (`GeometryParse`, `MixedSrid`, `Reprojection`).
    pub fn format(
        &self,
        row: &SourceRow,
        codec: &mut GeometryCodec,
    ) -> Result<NormalizedRecord, SyncError> {
        let mut record = NormalizedRecord::new(row.row);
        let geometry_field = self.schema.geometry_field();

        for (name, raw) in &row.values {
            if Some(name.as_str()) == geometry_field {
                record.geometry = codec.encode(row.row, raw)?;
                continue;
            }

            let value = if self.clean_columns.contains(name) {
                coerce(&clean(raw), self.schema.field_type(name))
            } else {
                coerce(raw, self.schema.field_type(name))
            };
            trace!(row = row.row, field = %name, value = %value, "Formatted");
            record.attributes.insert(name.clone(), value);
        }

        if record.geometry.is_none() && geometry_field.is_some() {
            record.geometry = codec.encode(row.row, "")?;
        }

        Ok(record)
    }
}
