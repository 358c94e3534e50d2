use chrono::NaiveDate;

use crate::models::Sex;

/// Service prefixes stripped from examination designations
const SERVICE_PREFIXES: [&str; 9] = ["RX ", "LAB ", "MA ", "MED ", "CHR ", "CO ", "UPEC ", "SP ", "CA "];

/// Display label for a one-letter sex code ("N/A" when empty)
pub fn sex_label(code: &str) -> String {
    Sex::from_code(code)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Examination designation without its service prefix, upper-cased.
/// Echography designations are kept whole.
pub fn examination_code(designation: &str) -> String {
    if designation.to_uppercase().starts_with("ECHO") {
        return designation.to_uppercase();
    }
    SERVICE_PREFIXES
        .iter()
        .find_map(|prefix| designation.strip_prefix(prefix))
        .unwrap_or(designation)
        .to_uppercase()
}

/// Group the digits of an integer by thousands: 1234567 -> "1,234,567"
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%d %b %Y").to_string()
    } else if let Some(d) = date.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        d.format("%d %b %Y").to_string()
    } else {
        date.to_string()
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Case-insensitive substring match used by the search filters
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_label() {
        assert_eq!(sex_label("H"), "Homme");
        assert_eq!(sex_label("F"), "Femme");
        assert_eq!(sex_label(""), "N/A");
    }

    #[test]
    fn test_examination_code() {
        assert_eq!(examination_code("LAB Glycémie"), "GLYCÉMIE");
        assert_eq!(examination_code("RX THORAX"), "THORAX");
        assert_eq!(examination_code("UPEC Bilan"), "BILAN");
        assert_eq!(examination_code("Echographie pelvienne"), "ECHOGRAPHIE PELVIENNE");
        assert_eq!(examination_code("NFS"), "NFS");
        // Prefix must match exactly, including the space
        assert_eq!(examination_code("LABO"), "LABO");
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_thousands(-25000), "-25,000");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-12"), "12 Mar 2024");
        assert_eq!(format_date("2024-03-12 10:30:00"), "12 Mar 2024");
        assert_eq!(format_date("2024-03-12T10:30:00Z"), "12 Mar 2024");
        assert_eq!(format_date("hier"), "hier");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Hématologie", 6), "Hém...");
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("LAB GLYCEMIE", "glyc"));
        assert!(!contains_ignore_case("LAB UREE", "glyc"));
    }
}
