use serde::{Deserialize, Serialize};

use super::de;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Parse the backend's one-letter code. `H` (homme) is male, any other
    /// non-empty code is female.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "" => None,
            c if c.eq_ignore_ascii_case("H") => Some(Sex::Male),
            _ => Some(Sex::Female),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "H",
            Sex::Female => "F",
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sex::Male => write!(f, "Homme"),
            Sex::Female => write!(f, "Femme"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    pub code: String,
    pub nom: String,
    #[serde(default)]
    pub sexe: String,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub age: Option<i64>,
    #[serde(default)]
    pub date_naissance: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub quartier: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub situation_matrimoniale: Option<String>,
}

impl Patient {
    pub fn sex(&self) -> Option<Sex> {
        Sex::from_code(&self.sexe)
    }

    pub fn sex_display(&self) -> String {
        self.sex().map(|s| s.to_string()).unwrap_or_else(|| "N/A".to_string())
    }

    pub fn age_display(&self) -> String {
        match self.age {
            Some(age) if age > 0 => format!("{} ans", age),
            _ => "N/A".to_string(),
        }
    }

    pub fn phone_display(&self) -> &str {
        match self.telephone.as_deref() {
            Some(phone) if !phone.trim().is_empty() => phone,
            _ => "N/A",
        }
    }
}
