use serde::{Deserialize, Serialize};

use super::de;

/// The small administrable lists of the configuration screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Unit,
    SampleType,
    HospitalService,
    ExaminationCategory,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::Unit,
        ReferenceKind::SampleType,
        ReferenceKind::HospitalService,
        ReferenceKind::ExaminationCategory,
    ];

    /// Suffix of the backend endpoints for this list, e.g. `get_units.php`
    pub fn resource(&self) -> &'static str {
        match self {
            ReferenceKind::Unit => "units",
            ReferenceKind::SampleType => "sample_types",
            ReferenceKind::HospitalService => "hospital_services",
            ReferenceKind::ExaminationCategory => "examination_categories",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::Unit => "Unités",
            ReferenceKind::SampleType => "Types d'échantillon",
            ReferenceKind::HospitalService => "Services hospitaliers",
            ReferenceKind::ExaminationCategory => "Catégories d'examens",
        }
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "unit" | "units" => Ok(ReferenceKind::Unit),
            "sample" | "samples" | "sample_type" | "sample_types" => Ok(ReferenceKind::SampleType),
            "service" | "services" | "hospital_service" | "hospital_services" => {
                Ok(ReferenceKind::HospitalService)
            }
            "category" | "categories" | "examination_category" | "examination_categories" => {
                Ok(ReferenceKind::ExaminationCategory)
            }
            other => {
                let known: Vec<&str> = ReferenceKind::ALL.iter().map(ReferenceKind::resource).collect();
                Err(format!("Unknown reference list: {} (expected one of {})", other, known.join(", ")))
            }
        }
    }
}

/// Entry of a reference list. Categories name themselves `designation`,
/// the other lists `nom`; both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceItem {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    #[serde(alias = "designation")]
    pub nom: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("units".parse::<ReferenceKind>(), Ok(ReferenceKind::Unit));
        assert_eq!("sample-types".parse::<ReferenceKind>(), Ok(ReferenceKind::SampleType));
        assert_eq!("Services".parse::<ReferenceKind>(), Ok(ReferenceKind::HospitalService));
        assert_eq!("category".parse::<ReferenceKind>(), Ok(ReferenceKind::ExaminationCategory));
        let err = "patients".parse::<ReferenceKind>().unwrap_err();
        assert!(err.starts_with("Unknown reference list: patients"));
        for kind in ReferenceKind::ALL {
            assert!(err.contains(kind.resource()), "{} missing from {}", kind.resource(), err);
        }
    }

    #[test]
    fn test_item_accepts_both_names() {
        let unit: ReferenceItem = serde_json::from_str(r#"{"id":1,"nom":"mg/dL"}"#).unwrap();
        let category: ReferenceItem = serde_json::from_str(r#"{"id":"4","designation":"Hématologie"}"#).unwrap();
        assert_eq!(unit.id, "1");
        assert_eq!(unit.nom, "mg/dL");
        assert_eq!(category.nom, "Hématologie");
    }
}
