//! Plain-text rendering of backend data for the terminal.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use labdesk_core::auth::Session;
use labdesk_core::models::{
    Bilan, BilanDetails, Examination, ListingItem, Patient, ReferenceItem, ReferenceKind,
    ReferenceValue,
};
use labdesk_core::utils::{examination_code, format_date, format_thousands, truncate_string};

/// Width of the designation column in tables
const NAME_WIDTH: usize = 36;

pub fn session(session: &Session, now: DateTime<Utc>) -> String {
    let expires = session.expires_at.with_timezone(&Local);
    let minutes = session.minutes_until_expiry(now);
    format!(
        "Logged in. Session expires {} ({}h{:02} left).",
        expires.format("%Y-%m-%d %H:%M"),
        minutes / 60,
        minutes % 60
    )
}

pub fn patients(patients: &[Patient]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<NAME_WIDTH$} {:<6} {:<8} {}", "CODE", "NOM", "SEXE", "ÂGE", "TÉLÉPHONE");
    for p in patients {
        let _ = writeln!(
            out,
            "{:<12} {:<NAME_WIDTH$} {:<6} {:<8} {}",
            p.code,
            truncate_string(&p.nom, NAME_WIDTH),
            p.sex_display(),
            p.age_display(),
            p.phone_display()
        );
    }
    out
}

pub fn patient(p: &Patient) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", p.nom, p.code);
    let _ = writeln!(out, "  Sexe:       {}", p.sex_display());
    let _ = writeln!(out, "  Âge:        {}", p.age_display());
    if let Some(birth) = p.date_naissance.as_deref() {
        let _ = writeln!(out, "  Naissance:  {}", format_date(birth));
    }
    let _ = writeln!(out, "  Téléphone:  {}", p.phone_display());
    for (label, value) in [
        ("Quartier", &p.quartier),
        ("Profession", &p.profession),
        ("Situation", &p.situation_matrimoniale),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            let _ = writeln!(out, "  {:<11} {}", format!("{}:", label), value);
        }
    }
    out
}

pub fn bilans(bilans: &[Bilan]) -> String {
    if bilans.is_empty() {
        return "No bilan recorded.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<12} {:<14} {}", "FACTURE", "CODE LABO", "DATE", "STATUT");
    for b in bilans {
        let _ = writeln!(
            out,
            "{:<16} {:<12} {:<14} {}",
            b.num_facture,
            b.code_labo.as_deref().unwrap_or("N/A"),
            b.save_at.as_deref().map(format_date).unwrap_or_default(),
            b.status
        );
    }
    out
}

pub fn bilan_details(d: &BilanDetails) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bilan {} - {}", d.num_facture, d.status());
    let _ = writeln!(out, "  Catégorie:    {}", d.categorie.display());
    let _ = writeln!(out, "  Prescripteur: {}", d.prescripteur.display());
    let _ = writeln!(out, "  Code labo:    {}", d.code_labo.as_deref().unwrap_or("N/A"));
    let _ = writeln!(out, "  Échantillon:  {}", d.type_echantillon.display());
    let _ = writeln!(out);
    let _ = writeln!(out, "{:>6}  {:<NAME_WIDTH$} {:<20} {}", "ID", "EXAMEN", "RÉSULTAT", "RÉFÉRENCE");
    for e in &d.examens {
        let _ = writeln!(
            out,
            "{:>6}  {:<NAME_WIDTH$} {:<20} {}",
            e.id,
            truncate_string(&examination_code(&e.designation_examen), NAME_WIDTH),
            e.resultat.as_deref().filter(|r| !r.trim().is_empty()).unwrap_or("-"),
            e.valeur_reference.as_deref().unwrap_or("N/A")
        );
    }
    if let Some(comment) = d.commentaire.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(out, "\nCommentaire: {}", comment);
    }
    out
}

pub fn listing(start: &str, end: &str, items: &[ListingItem]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Listing du {} au {}", format_date(start), format_date(end));
    let _ = writeln!(out, "{:<NAME_WIDTH$} {:>8}  {:<12} {}", "EXAMEN", "TOTAL", "PREMIER", "DERNIER");
    for item in items {
        let _ = writeln!(
            out,
            "{:<NAME_WIDTH$} {:>8}  {:<12} {}",
            truncate_string(&examination_code(&item.exam), NAME_WIDTH),
            format_thousands(item.total_exams.unwrap_or(0)),
            item.first_exam_date.as_deref().map(format_date).unwrap_or_default(),
            item.last_exam_date.as_deref().map(format_date).unwrap_or_default()
        );
    }
    let _ = writeln!(out, "{:<NAME_WIDTH$} {:>8}", "TOTAL", format_thousands(ListingItem::total(items)));
    out
}

pub fn examinations(exams: &[Examination], categories: &[ReferenceItem]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>6}  {:<NAME_WIDTH$} {}", "ID", "DÉSIGNATION", "CATÉGORIE");
    for e in exams {
        let category = e
            .categorie_id
            .as_deref()
            .and_then(|id| categories.iter().find(|c| c.id == id))
            .map(|c| c.nom.as_str())
            .unwrap_or("N/A");
        let _ = writeln!(
            out,
            "{:>6}  {:<NAME_WIDTH$} {}",
            e.id,
            truncate_string(&e.designation, NAME_WIDTH),
            category
        );
    }
    out
}

pub fn reference_items(kind: ReferenceKind, items: &[ReferenceItem]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", kind.label());
    for item in items {
        let _ = writeln!(out, "{:>6}  {}", item.id, item.nom);
    }
    out
}

pub fn reference_values(values: &[ReferenceValue]) -> String {
    if values.is_empty() {
        return "No reference value.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:>6}  {:<18} {:<6} {:<14} {}", "ID", "VALEURS", "SEXE", "ÂGE", "CONDITION");
    for v in values {
        let _ = writeln!(
            out,
            "{:>6}  {:<18} {:<6} {:<14} {}",
            v.id,
            v.range_display(),
            v.sexe.as_deref().unwrap_or("Tous"),
            v.age_display(),
            v.specific_condition
                .as_ref()
                .map(|c| c.designation.as_str())
                .unwrap_or("-")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_session_line() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let s = Session {
            token: "t".to_string(),
            expires_at: now + Duration::minutes(150),
        };
        assert!(session(&s, now).ends_with("(2h30 left)."));
    }

    #[test]
    fn test_listing_total_row() {
        let items: Vec<ListingItem> = serde_json::from_str(
            r#"[{"exam":"LAB NFS","total_exams":1200},{"exam":"LAB GLYCEMIE","total_exams":"34"}]"#,
        )
        .unwrap();
        let text = listing("2024-01-01", "2024-01-31", &items);
        assert!(text.starts_with("Listing du 01 Jan 2024 au 31 Jan 2024"));
        assert!(text.contains("NFS"));
        assert!(text.lines().last().unwrap().ends_with("1,234"));
    }
}
