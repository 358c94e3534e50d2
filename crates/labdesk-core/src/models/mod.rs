//! Data models for laboratory records.
//!
//! This module contains the data structures exchanged with the backend:
//!
//! - `Patient`: identity and contact details
//! - `Bilan`, `BilanDetails`, `ExaminationLine`: work-orders and their results
//! - `ListingItem`: per-examination totals over a period
//! - `Examination`, `ReferenceValue`, `SpecificCondition`: examination catalog
//!   and normal-value ranges
//! - `ReferenceItem`, `ReferenceKind`: small administrable lists (units,
//!   sample types, hospital services, examination categories)
//!
//! The PHP backend is inconsistent about numeric identifiers (sometimes
//! `12`, sometimes `"12"`), so identifier fields accept both.

pub mod bilan;
pub mod examination;
pub mod patient;
pub mod reference;

pub use bilan::{Bilan, BilanDetails, BilanStatus, ExaminationLine, ListingItem, NewBilan, NamedRef};
pub use examination::{
    Examination, ExaminationInput, NewReferenceValue, ReferenceValue, SpecificCondition,
};
pub use patient::{Patient, Sex};
pub use reference::{ReferenceItem, ReferenceKind};

pub(crate) mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Int(i64),
        Float(f64),
    }

    impl StringOrNumber {
        fn into_string(self) -> String {
            match self {
                StringOrNumber::String(s) => s,
                StringOrNumber::Int(n) => n.to_string(),
                StringOrNumber::Float(n) => n.to_string(),
            }
        }
    }

    /// Identifier sent as either a JSON string or number
    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        StringOrNumber::deserialize(deserializer).map(StringOrNumber::into_string)
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Option::<StringOrNumber>::deserialize(deserializer)
            .map(|v| v.map(StringOrNumber::into_string))
    }

    /// Number sent as either a JSON number or a numeric string
    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        use serde::de::Error;
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => Ok(None),
            Some(StringOrNumber::Int(n)) => Ok(Some(n as f64)),
            Some(StringOrNumber::Float(n)) => Ok(Some(n)),
            Some(StringOrNumber::String(s)) if s.trim().is_empty() => Ok(None),
            Some(StringOrNumber::String(s)) => s
                .trim()
                .replace(',', ".")
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("not a number: {}", s))),
        }
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        use serde::de::Error;
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => Ok(None),
            Some(StringOrNumber::Int(n)) => Ok(Some(n)),
            Some(StringOrNumber::Float(n)) => Ok(Some(n as i64)),
            Some(StringOrNumber::String(s)) if s.trim().is_empty() => Ok(None),
            Some(StringOrNumber::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("not an integer: {}", s))),
        }
    }
}
