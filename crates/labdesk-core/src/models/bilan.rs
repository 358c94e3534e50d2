use serde::{Deserialize, Serialize};

use super::de;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BilanStatus {
    #[serde(rename = "Complété")]
    Complete,
    #[serde(rename = "Incomplet")]
    Incomplete,
}

impl std::fmt::Display for BilanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BilanStatus::Complete => write!(f, "Complété"),
            BilanStatus::Incomplete => write!(f, "Incomplet"),
        }
    }
}

/// A lab work-order as listed in a patient's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bilan {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub prescripteur_id: Option<String>,
    pub num_facture: String,
    #[serde(default)]
    pub code_labo: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub service_id: Option<String>,
    #[serde(default)]
    pub save_at: Option<String>,
    pub status: BilanStatus,
}

/// Body of a work-order creation request.
#[derive(Debug, Clone, Serialize)]
pub struct NewBilan {
    pub patient_code: String,
    pub num_facture: String,
    pub code_labo: String,
    pub prescripteur: String,
}

/// `{ "designation": ... }` sub-object used for categories, prescribers and
/// sample types inside bilan details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "de::opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
}

impl NamedRef {
    pub fn display(&self) -> &str {
        match self.designation.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => "N/A",
        }
    }
}

/// One examination of a bilan, with its result once entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExaminationLine {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    pub designation_examen: String,
    #[serde(default)]
    pub resultat: Option<String>,
    #[serde(default)]
    pub valeur_reference: Option<String>,
}

impl ExaminationLine {
    pub fn has_result(&self) -> bool {
        self.resultat.as_deref().is_some_and(|r| !r.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilanDetails {
    pub num_facture: String,
    #[serde(default)]
    pub categorie: NamedRef,
    #[serde(default)]
    pub prescripteur: NamedRef,
    #[serde(default)]
    pub code_labo: Option<String>,
    #[serde(default)]
    pub type_echantillon: NamedRef,
    #[serde(default)]
    pub commentaire: Option<String>,
    #[serde(default)]
    pub examens: Vec<ExaminationLine>,
}

impl BilanDetails {
    /// Examinations still waiting for a result
    pub fn pending(&self) -> impl Iterator<Item = &ExaminationLine> {
        self.examens.iter().filter(|e| !e.has_result())
    }

    pub fn status(&self) -> BilanStatus {
        if self.pending().next().is_none() {
            BilanStatus::Complete
        } else {
            BilanStatus::Incomplete
        }
    }

    pub fn examination(&self, id: &str) -> Option<&ExaminationLine> {
        self.examens.iter().find(|e| e.id == id)
    }
}

/// Per-examination totals for a reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingItem {
    pub exam: String,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub total_exams: Option<i64>,
    #[serde(default)]
    pub first_exam_date: Option<String>,
    #[serde(default)]
    pub last_exam_date: Option<String>,
}

impl ListingItem {
    /// Sum of examinations across a listing
    pub fn total(items: &[ListingItem]) -> i64 {
        items.iter().filter_map(|i| i.total_exams).sum()
    }
}
