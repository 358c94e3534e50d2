use serde::{Deserialize, Serialize};

use super::de;
use super::patient::Sex;

/// An examination in the laboratory catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Examination {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    pub designation: String,
    #[serde(default)]
    pub contenu: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub categorie_id: Option<String>,
}

/// Body for creating or updating a catalog examination.
#[derive(Debug, Clone, Serialize)]
pub struct ExaminationInput {
    pub designation: String,
    pub contenu: Option<String>,
    pub categorie_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificCondition {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    pub designation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionLabel {
    pub designation: String,
}

/// A normal-value range for one examination, optionally restricted by sex,
/// age bracket or a specific condition (pregnancy, fasting, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceValue {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    #[serde(default)]
    pub designation_exam: Option<String>,
    #[serde(deserialize_with = "de::id")]
    pub id_exam: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub min_value: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub sexe: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub min_age: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub max_age: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub id_specific_condition: Option<String>,
    #[serde(default)]
    pub specific_condition: Option<ConditionLabel>,
}

impl ReferenceValue {
    pub fn range_display(&self) -> String {
        match (self.min_value, self.max_value) {
            (Some(min), Some(max)) => format!("{} - {}", min, max),
            (Some(min), None) => format!(">= {}", min),
            (None, Some(max)) => format!("<= {}", max),
            (None, None) => "N/A".to_string(),
        }
    }

    pub fn age_display(&self) -> String {
        match (self.min_age, self.max_age) {
            (Some(min), Some(max)) => format!("{}-{} ans", min, max),
            (Some(min), None) => format!(">= {} ans", min),
            (None, Some(max)) => format!("<= {} ans", max),
            (None, None) => "Tous âges".to_string(),
        }
    }

    /// Whether this range is meant for a patient of the given sex and age.
    /// Unset restrictions match everyone.
    pub fn applies_to(&self, sex: Option<Sex>, age: Option<i64>) -> bool {
        let sex_ok = match (self.sexe.as_deref().and_then(Sex::from_code), sex) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted == actual,
            (Some(_), None) => false,
        };
        let age_ok = match age {
            Some(age) => {
                self.min_age.map_or(true, |min| age >= min) && self.max_age.map_or(true, |max| age <= max)
            }
            None => self.min_age.is_none() && self.max_age.is_none(),
        };
        sex_ok && age_ok
    }
}

/// Body for creating a normal-value range.
#[derive(Debug, Clone, Serialize)]
pub struct NewReferenceValue {
    pub id_exam: String,
    pub designation: String,
    pub min_value: f64,
    pub max_value: Option<f64>,
    pub sexe: Option<String>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub id_specific_condition: Option<String>,
}

impl NewReferenceValue {
    /// Reject ranges the form would never submit
    pub fn validate(&self) -> Result<(), String> {
        if self.id_exam.trim().is_empty() {
            return Err("An examination must be selected".to_string());
        }
        if !self.min_value.is_finite() {
            return Err("Minimum value must be a number".to_string());
        }
        if let Some(max) = self.max_value {
            if max < self.min_value {
                return Err(format!("Maximum {} is below minimum {}", max, self.min_value));
            }
        }
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if max < min {
                return Err(format!("Maximum age {} is below minimum age {}", max, min));
            }
        }
        if let Some(sexe) = self.sexe.as_deref() {
            if Sex::from_code(sexe).is_none() {
                return Err("Sex must be H or F".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(json: &str) -> ReferenceValue {
        serde_json::from_str(json).expect("Failed to parse reference value")
    }

    #[test]
    fn test_parse_reference_value() {
        let value = range(
            r#"{"id":"5","designation_exam":"LAB GLYCEMIE","id_exam":3,"min_value":"0.70","max_value":1.1,"sexe":null,"min_age":"18","max_age":null,"id_specific_condition":"2","specific_condition":{"designation":"A jeun"}}"#,
        );

        assert_eq!(value.id_exam, "3");
        assert_eq!(value.min_value, Some(0.7));
        assert_eq!(value.range_display(), "0.7 - 1.1");
        assert_eq!(value.age_display(), ">= 18 ans");
        assert_eq!(value.specific_condition.map(|c| c.designation).as_deref(), Some("A jeun"));
    }

    #[test]
    fn test_applies_to() {
        let adult_women = range(r#"{"id":"1","id_exam":"3","min_value":12,"max_value":16,"sexe":"F","min_age":18,"max_age":null}"#);
        assert!(adult_women.applies_to(Some(Sex::Female), Some(30)));
        assert!(!adult_women.applies_to(Some(Sex::Male), Some(30)));
        assert!(!adult_women.applies_to(Some(Sex::Female), Some(12)));
        assert!(!adult_women.applies_to(None, Some(30)));

        let everyone = range(r#"{"id":"2","id_exam":"3","min_value":"4,5","max_value":null}"#);
        assert_eq!(everyone.min_value, Some(4.5));
        assert!(everyone.applies_to(None, None));
        assert!(everyone.applies_to(Some(Sex::Male), Some(70)));
    }

    #[test]
    fn test_new_reference_value_validation() {
        let mut value = NewReferenceValue {
            id_exam: "3".to_string(),
            designation: "LAB GLYCEMIE".to_string(),
            min_value: 0.7,
            max_value: Some(1.1),
            sexe: None,
            min_age: Some(18),
            max_age: Some(65),
            id_specific_condition: None,
        };
        assert!(value.validate().is_ok());

        value.max_value = Some(0.5);
        assert!(value.validate().is_err());

        value.max_value = None;
        value.max_age = Some(10);
        assert!(value.validate().is_err());

        value.max_age = None;
        value.sexe = Some(" ".to_string());
        assert!(value.validate().is_err());
    }
}
