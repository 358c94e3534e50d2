//! Typed client for the laboratory backend.
//!
//! Each method maps to one PHP endpoint. Requests go through the
//! [`AuthenticatedClient`] pipeline; non-success statuses are turned into
//! [`ApiError::Request`] with an operation-specific message.

use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::error::{ApiError, AuthError};
use super::pipeline::{AuthenticatedClient, RequestOptions};
use super::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::auth::SessionStore;
use crate::config::Config;
use crate::models::{
    Bilan, BilanDetails, Examination, ExaminationInput, ListingItem, NewBilan, NewReferenceValue,
    Patient, ReferenceItem, ReferenceKind, ReferenceValue, SpecificCondition,
};

const LOGIN_PATH: &str = "login.php";

/// Shown when the server refuses credentials without saying why
const DEFAULT_LOGIN_ERROR: &str = "Identifiant ou mot de passe incorrect";

/// Date format expected by the listing endpoint
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// API client for the laboratory backend.
/// Clone is cheap - the transport and session store are shared.
#[derive(Clone)]
pub struct LabClient<T = ReqwestTransport> {
    api: AuthenticatedClient<T>,
}

impl LabClient<ReqwestTransport> {
    /// Client for the configured backend, sharing `store` for the session
    pub fn from_config(config: &Config, store: Arc<SessionStore>) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::with_timeout(config.request_timeout())?;
        let api = AuthenticatedClient::new(transport, store, &config.api_base_url)?;
        Ok(Self::new(api))
    }
}

impl<T: Transport> LabClient<T> {
    pub fn new(api: AuthenticatedClient<T>) -> Self {
        Self { api }
    }

    /// Backend every request is resolved against
    pub fn base_url(&self) -> &Url {
        self.api.base_url()
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.api.store()
    }

    // ===== Session =====

    /// Exchange credentials for a token and start a 24 hour session.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = serde_json::to_vec(&json!({ "username": username, "password": password }))
            .map_err(ApiError::InvalidBody)?;

        let request = HttpRequest {
            method: Method::POST,
            url: self.api.endpoint(LOGIN_PATH)?,
            headers,
            body: Some(body),
        };

        let response = self.api.transport().send(request).await?;
        let data: Option<LoginResponse> = response.json().ok();

        if !response.ok() {
            let message = data
                .and_then(|d| d.error)
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string());
            info!(username = username, status = response.status().as_u16(), "Login rejected");
            return Err(AuthError::Rejected(message));
        }

        let data = data.ok_or_else(|| AuthError::InvalidResponse(response.text()))?;
        let token = match (data.token, data.error) {
            (Some(token), _) if !token.trim().is_empty() => token,
            (_, Some(error)) if !error.trim().is_empty() => return Err(AuthError::Rejected(error)),
            _ => return Err(AuthError::InvalidResponse("missing token".to_string())),
        };

        let store = self.session();
        store.save_session(&token, store.now());
        info!(username = username, "Logged in");
        Ok(())
    }

    /// Forget the session. No request is sent.
    pub fn logout(&self) {
        self.session().clear_session();
        info!("Logged out");
    }

    // ===== Patients =====

    pub async fn search_patients(&self, term: &str) -> Result<Vec<Patient>, ApiError> {
        let options = RequestOptions::get().query("q", term.trim());
        self.fetch("search_patients.php", options, "Failed to search patients").await
    }

    pub async fn patient_by_code(&self, code: &str) -> Result<Patient, ApiError> {
        let options = RequestOptions::get().query("code", code);
        self.fetch("get_patient.php", options, "Failed to fetch patient details").await
    }

    pub async fn patient_bilans(&self, code: &str) -> Result<Vec<Bilan>, ApiError> {
        let options = RequestOptions::get().query("code", code);
        self.fetch("get_patient_bilans_by_code.php", options, "Failed to fetch patient bilans")
            .await
    }

    // ===== Bilans =====

    pub async fn create_bilan(&self, bilan: &NewBilan) -> Result<Bilan, ApiError> {
        for (field, value) in [
            ("invoice number", &bilan.num_facture),
            ("patient code", &bilan.patient_code),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::InvalidInput(format!("{} is required", field)));
            }
        }
        let options = RequestOptions::post().json(bilan)?;
        self.fetch("create_bilan.php", options, "Failed to create bilan").await
    }

    pub async fn bilan_details(&self, num_facture: &str) -> Result<BilanDetails, ApiError> {
        let options = RequestOptions::get().query("num_facture", num_facture);
        self.fetch("get_bilan_details.php", options, "Failed to fetch bilan details").await
    }

    /// Save the result of one examination line, along with the bilan comment
    pub async fn update_examination_result(
        &self,
        exam_id: &str,
        result: &str,
        comment: &str,
    ) -> Result<(), ApiError> {
        let options = RequestOptions::post().json(&json!({
            "id": exam_id,
            "resultat": result,
            "commentaire": comment,
        }))?;
        self.execute("update_examination_result.php", options, "Failed to save result")
            .await
    }

    /// Examination totals between two `YYYY-MM-DD` dates, both inclusive
    pub async fn listing(&self, start: &str, end: &str) -> Result<Vec<ListingItem>, ApiError> {
        let (start_date, end_date) = (parse_date(start)?, parse_date(end)?);
        if end_date < start_date {
            return Err(ApiError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let options = RequestOptions::get()
            .query("start_date", start_date.format(DATE_FORMAT))
            .query("end_date", end_date.format(DATE_FORMAT));
        self.fetch("get_listing_bilans.php", options, "Failed to fetch listing").await
    }

    // ===== Examinations =====

    pub async fn examinations(&self) -> Result<Vec<Examination>, ApiError> {
        self.fetch("get_examinations.php", RequestOptions::get(), "Failed to fetch examinations")
            .await
    }

    /// Examinations performed by the laboratory, with their content template
    pub async fn lab_examinations(&self) -> Result<Vec<Examination>, ApiError> {
        self.fetch("get_examens_labo.php", RequestOptions::get(), "Failed to fetch examinations")
            .await
    }

    pub async fn examination_categories(&self) -> Result<Vec<ReferenceItem>, ApiError> {
        self.list_reference(ReferenceKind::ExaminationCategory).await
    }

    pub async fn create_examination(&self, input: &ExaminationInput) -> Result<Examination, ApiError> {
        require("designation", &input.designation)?;
        let options = RequestOptions::post().json(input)?;
        self.fetch("create_examination.php", options, "Failed to create examination").await
    }

    pub async fn update_examination(&self, id: &str, input: &ExaminationInput) -> Result<(), ApiError> {
        require("designation", &input.designation)?;
        let mut body = serde_json::to_value(input).map_err(ApiError::InvalidBody)?;
        body["id"] = json!(id);
        let options = RequestOptions::post().json(&body)?;
        self.execute("update_examination.php", options, "Failed to update examination").await
    }

    pub async fn delete_examination(&self, id: &str) -> Result<(), ApiError> {
        let options = RequestOptions::delete().query("id", id);
        self.execute("delete_examination.php", options, "Failed to delete examination").await
    }

    // ===== Normal values =====

    pub async fn reference_values(&self, exam_id: &str) -> Result<Vec<ReferenceValue>, ApiError> {
        let options = RequestOptions::get().query("id_exam", exam_id);
        self.fetch("get_reference_values.php", options, "Failed to fetch reference values")
            .await
    }

    pub async fn create_reference_value(&self, value: &NewReferenceValue) -> Result<(), ApiError> {
        value.validate().map_err(ApiError::InvalidInput)?;
        let options = RequestOptions::post().json(value)?;
        self.execute("create_reference_value.php", options, "Failed to add reference value")
            .await
    }

    pub async fn delete_reference_value(&self, id: &str) -> Result<(), ApiError> {
        let options = RequestOptions::delete().query("id", id);
        self.execute("delete_reference_value.php", options, "Failed to delete reference value")
            .await
    }

    pub async fn specific_conditions(&self) -> Result<Vec<SpecificCondition>, ApiError> {
        self.fetch(
            "get_specific_conditions.php",
            RequestOptions::get(),
            "Failed to fetch specific conditions",
        )
        .await
    }

    pub async fn create_specific_condition(&self, designation: &str) -> Result<SpecificCondition, ApiError> {
        require("designation", designation)?;
        let options = RequestOptions::post().json(&json!({ "designation": designation.trim() }))?;
        self.fetch("create_specific_condition.php", options, "Failed to create specific condition")
            .await
    }

    // ===== Reference lists =====

    pub async fn list_reference(&self, kind: ReferenceKind) -> Result<Vec<ReferenceItem>, ApiError> {
        let path = format!("get_{}.php", kind.resource());
        let context = format!("Failed to fetch {}", kind.label());
        self.fetch(&path, RequestOptions::get(), &context).await
    }

    pub async fn create_reference(&self, kind: ReferenceKind, name: &str) -> Result<ReferenceItem, ApiError> {
        require("name", name)?;
        let path = format!("create_{}.php", kind.resource());
        let options = RequestOptions::post().json(&json!({ "nom": name.trim() }))?;
        let context = format!("Failed to add to {}", kind.label());
        self.fetch(&path, options, &context).await
    }

    pub async fn rename_reference(&self, kind: ReferenceKind, id: &str, name: &str) -> Result<(), ApiError> {
        require("name", name)?;
        let path = format!("update_{}.php", kind.resource());
        let options = RequestOptions::post().json(&json!({ "id": id, "nom": name.trim() }))?;
        let context = format!("Failed to update {}", kind.label());
        self.execute(&path, options, &context).await
    }

    pub async fn delete_reference(&self, kind: ReferenceKind, id: &str) -> Result<(), ApiError> {
        let path = format!("delete_{}.php", kind.resource());
        let options = RequestOptions::delete().query("id", id);
        let context = format!("Failed to delete from {}", kind.label());
        self.execute(&path, options, &context).await
    }

    // ===== Helpers =====

    async fn fetch<R: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
        context: &str,
    ) -> Result<R, ApiError> {
        let response = self.api.request(path, options).await?;
        if !response.ok() {
            return Err(ApiError::from_status(response.status(), context, &response.text()));
        }
        response.json().map_err(|e| {
            debug!(path = path, error = %e, "Unexpected response body");
            e
        })
    }

    /// Like `fetch` for endpoints whose body carries nothing we need
    async fn execute(&self, path: &str, options: RequestOptions, context: &str) -> Result<(), ApiError> {
        let response = self.api.request(path, options).await?;
        if !response.ok() {
            return Err(ApiError::from_status(response.status(), context, &response.text()));
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::InvalidInput(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ApiError::InvalidInput(format!("expected a YYYY-MM-DD date, got {:?}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::pipeline::tests::{logged_in, t0, FakeTransport};
    use crate::auth::{ManualClock, MemoryStorage};
    use chrono::Duration;
    use reqwest::StatusCode;

    fn lab(store: Arc<SessionStore>) -> (LabClient<FakeTransport>, FakeTransport) {
        let transport = FakeTransport::default();
        let api = AuthenticatedClient::new(transport.clone(), store, "http://serveur/hdmbanga/").unwrap();
        (LabClient::new(api), transport)
    }

    fn body_of(transport: &FakeTransport) -> serde_json::Value {
        serde_json::from_slice(&transport.last().body.unwrap()).unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        let (store, _clock) = logged_in("tok");
        let transport = FakeTransport::default();
        let api = AuthenticatedClient::new(transport, store, " http://serveur/hdmbanga ").unwrap();
        assert_eq!(LabClient::new(api).base_url().as_str(), "http://serveur/hdmbanga/");
    }

    #[tokio::test]
    async fn test_login_saves_session() {
        let clock = ManualClock::new(t0());
        let store = Arc::new(SessionStore::new(MemoryStorage::new(), clock.clone()));
        let (client, transport) = lab(store.clone());
        transport.reply(200, r#"{"token":"tok-1"}"#);

        client.login("laborantin", "secret").await.unwrap();

        let sent = transport.last();
        assert_eq!(sent.url.as_str(), "http://serveur/hdmbanga/login.php");
        assert!(sent.headers.get(header::AUTHORIZATION).is_none());
        assert_eq!(body_of(&transport), json!({"username": "laborantin", "password": "secret"}));

        let session = store.session().unwrap();
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.expires_at, t0() + Duration::hours(24));
    }

    #[tokio::test]
    async fn test_login_rejected_uses_server_message() {
        let store = Arc::new(SessionStore::in_memory());
        let (client, transport) = lab(store.clone());
        transport.reply(403, r#"{"error":"Compte désactivé"}"#).reply(401, "");

        let err = client.login("laborantin", "bad").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(ref m) if m == "Compte désactivé"));

        let err = client.login("laborantin", "bad").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(ref m) if m == DEFAULT_LOGIN_ERROR));
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn test_login_network_failure() {
        let store = Arc::new(SessionStore::in_memory());
        let (client, transport) = lab(store.clone());
        transport.fail("connection refused");

        let err = client.login("laborantin", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn test_logout_clears_without_request() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store.clone());

        client.logout();
        client.logout();

        assert!(!store.is_logged_in());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_patients() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);
        transport.reply(
            200,
            r#"[{"id":1,"code":"P-1","nom":"ETOA Paul","sexe":"H","age":41,"date_naissance":"1983-05-02","telephone":"677000000"}]"#,
        );

        let patients = client.search_patients(" etoa ").await.unwrap();

        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].nom, "ETOA Paul");
        assert_eq!(
            transport.last().url.as_str(),
            "http://serveur/hdmbanga/search_patients.php?q=etoa"
        );
    }

    #[tokio::test]
    async fn test_non_success_becomes_request_error() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store.clone());
        transport.reply(404, r#"{"error":"not found"}"#);

        let err = client.patient_by_code("P-404").await.unwrap_err();

        match err {
            ApiError::Request { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(message.starts_with("Failed to fetch patient details"));
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.is_logged_in());
    }

    #[tokio::test]
    async fn test_wrapper_propagates_session_expired() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store.clone());
        transport.reply(401, "");

        let err = client.patient_bilans("P-1").await.unwrap_err();

        assert!(matches!(err, ApiError::SessionExpired));
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);
        transport.reply(200, "<html>maintenance</html>");

        let err = client.examinations().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_update_examination_result_body() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);
        transport.reply(200, r#"{"success":true}"#);

        client
            .update_examination_result("11", "0.95 g/L", "Prélèvement à jeun")
            .await
            .unwrap();

        let sent = transport.last();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(
            body_of(&transport),
            json!({"id": "11", "resultat": "0.95 g/L", "commentaire": "Prélèvement à jeun"})
        );
    }

    #[tokio::test]
    async fn test_listing_rejects_inverted_range_locally() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);

        let err = client.listing("2024-03-31", "2024-03-01").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRange { .. }));

        let err = client.listing("31/03/2024", "2024-04-01").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(transport.calls(), 0);

        transport.reply(200, "[]");
        let items = client.listing("2024-03-01", "2024-03-01").await.unwrap();
        assert!(items.is_empty());
        assert_eq!(
            transport.last().url.query(),
            Some("start_date=2024-03-01&end_date=2024-03-01")
        );
    }

    #[tokio::test]
    async fn test_reference_lists_use_kind_endpoints() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);
        transport
            .reply(200, r#"[{"id":"1","nom":"mg/dL"},{"id":"2","nom":"mmol/L"}]"#)
            .reply(200, r#"{"id":"3","nom":"g/L"}"#)
            .reply(200, r#"{"success":true}"#);

        let units = client.list_reference(ReferenceKind::Unit).await.unwrap();
        assert_eq!(units.len(), 2);
        assert!(transport.last().url.as_str().ends_with("/get_units.php"));

        let created = client.create_reference(ReferenceKind::Unit, " g/L ").await.unwrap();
        assert_eq!(created.id, "3");
        assert_eq!(body_of(&transport), json!({"nom": "g/L"}));

        client.delete_reference(ReferenceKind::HospitalService, "9").await.unwrap();
        let sent = transport.last();
        assert_eq!(sent.method, Method::DELETE);
        assert_eq!(sent.url.as_str(), "http://serveur/hdmbanga/delete_hospital_services.php?id=9");

        let err = client.rename_reference(ReferenceKind::SampleType, "1", "  ").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_update_examination_includes_id() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);

        let input = ExaminationInput {
            designation: "LAB GLYCEMIE".to_string(),
            contenu: None,
            categorie_id: "2".to_string(),
        };
        client.update_examination("14", &input).await.unwrap();

        let body = body_of(&transport);
        assert_eq!(body["id"], "14");
        assert_eq!(body["designation"], "LAB GLYCEMIE");
        assert_eq!(body["categorie_id"], "2");
    }

    #[tokio::test]
    async fn test_invalid_reference_value_not_sent() {
        let (store, _clock) = logged_in("tok");
        let (client, transport) = lab(store);

        let value = NewReferenceValue {
            id_exam: "3".to_string(),
            designation: "LAB GLYCEMIE".to_string(),
            min_value: 1.2,
            max_value: Some(0.7),
            sexe: None,
            min_age: None,
            max_age: None,
            id_specific_condition: None,
        };
        let err = client.create_reference_value(&value).await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(transport.calls(), 0);
    }
}
