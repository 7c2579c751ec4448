//! HTTP surface: page, upload, process, preview, report download

use crate::flow::{FlowError, ImageFlow};
use crate::models::{ProcessRequest, ProcessResponse, StatusResponse, UploadResponse};
use crate::paths::REPORT_FILE_NAME;
use crate::prompts::INDEX_HTML;
use crate::session::{new_session_id, SessionRegistry, SESSION_COOKIE};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::info;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Largest accepted request body (uploads included)
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Multipart field the page posts the file under
const IMAGE_FIELD: &str = "image";

/// Upper bound on how often idle sessions are swept
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub struct AppState {
    pub flow: ImageFlow,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(flow: ImageFlow) -> Self {
        Self {
            flow,
            sessions: SessionRegistry::default(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Flow(FlowError),
    NotFound(&'static str),
    Internal(String),
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        ApiError::Flow(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Flow(e @ (FlowError::Upload(_) | FlowError::Validation(_))) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Flow(e @ FlowError::Remote(_)) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string()),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Resolves the caller's session id, issuing a cookie on first contact
fn session_for(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().to_string();
        return (jar, id);
    }
    let id = new_session_id();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), id)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/upload", post(upload))
        .route("/process", post(process))
        .route("/image", get(current_image))
        .route("/report", get(report))
        .route("/reset", post(reset))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn index(jar: CookieJar) -> impl IntoResponse {
    let (jar, _) = session_for(jar);
    (jar, Html(INDEX_HTML))
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(app): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session_id) = session_for(jar);
    // Published copy, so polling never waits on a request in flight
    let status = app.sessions.slot(&session_id).status();
    (jar, Json(status))
}

/// Pulls the image field out of the form as (file name, bytes)
async fn read_image_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read upload: {}", e))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("Failed to read upload: {}", e))?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err("no image in upload".to_string())
}

async fn upload(
    State(app): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> (CookieJar, Result<Json<UploadResponse>, ApiError>) {
    let (jar, session_id) = session_for(jar);
    let slot = app.sessions.slot(&session_id);
    let mut state = slot.state.lock().await;

    let result = match read_image_field(&mut multipart).await {
        Ok((file_name, bytes)) => {
            info!("[upload] {} bytes for '{}'", bytes.len(), file_name);
            app.flow.upload(&mut state, &bytes, &file_name).await
        }
        Err(e) => {
            app.flow.reset(&mut state).await;
            Err(FlowError::Upload(e))
        }
    };

    slot.publish(&state);
    (jar, result.map(Json).map_err(ApiError::from))
}

async fn process(
    State(app): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<ProcessRequest>,
) -> (CookieJar, Result<Json<ProcessResponse>, ApiError>) {
    let (jar, session_id) = session_for(jar);
    let slot = app.sessions.slot(&session_id);
    let mut state = slot.state.lock().await;

    if let Err(e) = ImageFlow::validate(&state, &request.prompt) {
        return (jar, Err(e.into()));
    }
    slot.publish_processing(&state);
    let result = app.flow.process(&mut state, &request.prompt).await;

    slot.publish(&state);
    (jar, result.map(Json).map_err(ApiError::from))
}

async fn current_image(State(app): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, session_id) = session_for(jar);
    let slot = app.sessions.slot(&session_id);
    let state = slot.state.lock().await;

    let Some(path) = state.current_image_path.as_ref() else {
        return (jar, ApiError::NotFound("No image uploaded")).into_response();
    };
    match app.flow.storage().read(path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();
            (jar, [(header::CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(e) => (jar, ApiError::Internal(e)).into_response(),
    }
}

async fn report(State(app): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, session_id) = session_for(jar);
    let state = app.sessions.snapshot(&session_id).await;

    match state.last_report {
        Some(report) => (
            jar,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", REPORT_FILE_NAME),
                ),
            ],
            report,
        )
            .into_response(),
        None => (jar, ApiError::NotFound("No report available yet")).into_response(),
    }
}

async fn reset(
    State(app): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<StatusResponse>) {
    let (jar, session_id) = session_for(jar);
    let slot = app.sessions.slot(&session_id);
    let mut state = slot.state.lock().await;
    app.flow.reset(&mut state).await;
    slot.publish(&state);
    (jar, Json(state.status()))
}

/// Drops sessions idle for `ttl` and deletes the images they still track.
///
/// Returns how many sessions were dropped.
pub async fn evict_idle_sessions(app: &AppState, ttl: Duration) -> usize {
    let evicted = app.sessions.evict_idle(ttl);
    let count = evicted.len();
    for mut state in evicted {
        app.flow.reset(&mut state).await;
    }
    if count > 0 {
        info!(
            "[session] Evicted {} idle session(s), {} active",
            count,
            app.sessions.active_sessions()
        );
    }
    count
}

/// Sweeps idle sessions in the background for the life of the server
pub fn spawn_session_sweeper(app: Arc<AppState>, ttl: Duration) -> tokio::task::JoinHandle<()> {
    let period = ttl.min(MAX_SWEEP_PERIOD);
    info!("[session] Expiring sessions idle for {}s", ttl.as_secs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            evict_idle_sessions(&app, ttl).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::tests::CannedClient;
    use crate::models::FlowPhase;
    use crate::storage::ImageStorage;
    use crate::vision::VisionClient;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-VISION-BOUNDARY";

    /// Holds every query until released, signalling when one has started
    #[derive(Default)]
    struct GatedClient {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl VisionClient for GatedClient {
        async fn query(&self, _base64_image: &str, _prompt: &str) -> Result<String, String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("a slow answer".to_string())
        }
    }

    fn app_with(client: Arc<dyn VisionClient>) -> (tempfile::TempDir, Arc<AppState>, Router) {
        let tmp = tempfile::tempdir().unwrap();
        let flow = ImageFlow::new(ImageStorage::new(tmp.path().join("images")), client);
        let state = Arc::new(AppState::new(flow));
        let router = build_router(state.clone());
        (tmp, state, router)
    }

    /// One-part form; `disposition` is everything after `form-data; `
    fn form_body(disposition: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; {disposition}\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_body(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        form_body(&format!("name=\"image\"; filename=\"{file_name}\""), bytes)
    }

    fn upload_request(cookie: Option<&str>, file_name: &str, bytes: &[u8]) -> Request<Body> {
        form_request(cookie, multipart_body(file_name, bytes))
    }

    fn form_request(cookie: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn process_request(cookie: &str, prompt: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/process")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from(json!({ "prompt": prompt }).to_string()))
            .unwrap()
    }

    fn get_request(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    /// `session_id=<uuid>` from a Set-Cookie header
    fn session_cookie(response: &Response) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie issued")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn index_serves_page_and_issues_session() {
        let (_tmp, _state, router) = app_with(CannedClient::ok("unused"));

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).starts_with("session_id="));
        let html = body_text(response).await;
        assert!(html.contains(r#"accept=".jpg,.jpeg,.png""#));
        assert!(html.contains("Download Analysis Report"));
    }

    #[tokio::test]
    async fn process_without_upload_is_rejected() {
        let client = CannedClient::ok("unused");
        let (_tmp, _state, router) = app_with(client.clone());

        let response = router
            .oneshot(process_request("session_id=fresh", "describe"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Please upload an image first!"));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn upload_process_download_round_trip() {
        let client = CannedClient::ok("a red square");
        let (tmp, state, router) = app_with(client.clone());
        let fake_jpeg = b"\xff\xd8\xff\xe0\x00\x10JFIF";

        let response = router
            .clone()
            .oneshot(upload_request(None, "fake.jpg", fake_jpeg))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        let session_id = cookie.trim_start_matches("session_id=").to_string();
        let stored = state
            .sessions
            .snapshot(&session_id)
            .await
            .current_image_path
            .unwrap();
        assert!(stored.exists());

        let preview = router
            .clone()
            .oneshot(get_request("/image", &cookie))
            .await
            .unwrap();
        assert_eq!(preview.status(), StatusCode::OK);
        assert_eq!(preview.headers()[header::CONTENT_TYPE], "image/jpeg");

        let response = router
            .clone()
            .oneshot(process_request(&cookie, "describe"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["response"], "a red square");
        assert!(body["report"].as_str().unwrap().contains("a red square"));
        assert!(!stored.exists());
        assert_eq!(
            std::fs::read_dir(tmp.path().join("images")).unwrap().count(),
            0
        );

        let download = router
            .clone()
            .oneshot(get_request("/report", &cookie))
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"analysis_report.txt\""
        );
        let report = body_text(download).await;
        assert!(report.contains("User Prompt:\ndescribe"));
        assert!(report.contains("a red square"));

        let preview = router
            .oneshot(get_request("/image", &cookie))
            .await
            .unwrap();
        assert_eq!(preview.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn remote_failure_maps_to_bad_gateway() {
        let (_tmp, state, router) = app_with(CannedClient::failing("model overloaded"));
        let response = router
            .clone()
            .oneshot(upload_request(Some("session_id=s1"), "fake.png", b"\x89PNG"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(process_request("session_id=s1", "describe"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response)
            .await
            .contains("Error during processing: model overloaded"));
        assert!(state.sessions.snapshot("s1").await.current_image_path.is_some());
    }

    #[tokio::test]
    async fn unsupported_upload_is_bad_request() {
        let (_tmp, state, router) = app_with(CannedClient::ok("unused"));

        let response = router
            .oneshot(upload_request(Some("session_id=s2"), "notes.txt", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Error processing image"));
        assert!(state.sessions.snapshot("s2").await.current_image_path.is_none());
    }

    #[tokio::test]
    async fn reset_clears_tracked_image() {
        let (_tmp, state, router) = app_with(CannedClient::ok("unused"));
        router
            .clone()
            .oneshot(upload_request(Some("session_id=s3"), "fake.jpg", b"\xff\xd8\xff"))
            .await
            .unwrap();
        let stored = state.sessions.snapshot("s3").await.current_image_path.unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reset")
                    .header(header::COOKIE, "session_id=s3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!stored.exists());
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["phase"], "no_image");
        assert_eq!(body["has_image"], false);
        assert!(body["image_name"].is_null());
    }

    #[tokio::test]
    async fn report_missing_is_not_found() {
        let (_tmp, _state, router) = app_with(CannedClient::ok("unused"));
        let response = router
            .oneshot(get_request("/report", "session_id=nobody"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn form_without_image_field_resets_session() {
        let (tmp, state, router) = app_with(CannedClient::ok("unused"));
        router
            .clone()
            .oneshot(upload_request(Some("session_id=s5"), "first.jpg", b"\xff\xd8\xff"))
            .await
            .unwrap();
        let first = state.sessions.snapshot("s5").await.current_image_path.unwrap();

        let response = router
            .clone()
            .oneshot(form_request(
                Some("session_id=s5"),
                form_body("name=\"document\"; filename=\"second.jpg\"", b"\xff\xd8\xff"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("no image in upload"));
        assert!(!first.exists());
        let session = state.sessions.snapshot("s5").await;
        assert!(session.current_image_path.is_none());
        assert_eq!(session.phase, FlowPhase::NoImage);
        assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 0);

        let status = router
            .oneshot(get_request("/status", "session_id=s5"))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(status).await).unwrap();
        assert_eq!(body["phase"], "no_image");
        assert_eq!(body["has_image"], false);
    }

    #[tokio::test]
    async fn image_field_without_filename_is_rejected() {
        let (_tmp, state, router) = app_with(CannedClient::ok("unused"));

        let response = router
            .oneshot(form_request(
                Some("session_id=s6"),
                form_body("name=\"image\"", b"\xff\xd8\xff"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Error processing image"));
        assert!(state.sessions.snapshot("s6").await.current_image_path.is_none());
    }

    #[tokio::test]
    async fn truncated_form_resets_session() {
        let (_tmp, state, router) = app_with(CannedClient::ok("unused"));
        router
            .clone()
            .oneshot(upload_request(Some("session_id=s7"), "first.png", b"\x89PNG"))
            .await
            .unwrap();
        let first = state.sessions.snapshot("s7").await.current_image_path.unwrap();
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cut.jpg\"\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(b"\xff\xd8\xff");

        let response = router
            .oneshot(form_request(Some("session_id=s7"), body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!first.exists());
        assert_eq!(state.sessions.snapshot("s7").await.phase, FlowPhase::NoImage);
    }

    #[tokio::test]
    async fn upload_during_processing_waits_and_is_kept() {
        let gate = Arc::new(GatedClient::default());
        let (tmp, state, router) = app_with(gate.clone());
        router
            .clone()
            .oneshot(upload_request(Some("session_id=busy"), "first.jpg", b"\xff\xd8\xff"))
            .await
            .unwrap();
        let first = state.sessions.snapshot("busy").await.current_image_path.unwrap();

        let processing = tokio::spawn(
            router
                .clone()
                .oneshot(process_request("session_id=busy", "describe")),
        );
        gate.entered.notified().await;

        let status = router
            .clone()
            .oneshot(get_request("/status", "session_id=busy"))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(status).await).unwrap();
        assert_eq!(body["phase"], "processing");
        assert_eq!(body["has_image"], true);

        let second_upload = tokio::spawn(router.clone().oneshot(upload_request(
            Some("session_id=busy"),
            "second.png",
            b"\x89PNG....",
        )));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!second_upload.is_finished());

        gate.release.notify_one();
        let processed = processing.await.unwrap().unwrap();
        let uploaded = second_upload.await.unwrap().unwrap();

        assert_eq!(processed.status(), StatusCode::OK);
        assert_eq!(uploaded.status(), StatusCode::OK);
        assert!(!first.exists());
        let session = state.sessions.snapshot("busy").await;
        let second = session.current_image_path.unwrap();
        assert!(second.exists());
        assert_eq!(session.original_name.as_deref(), Some("second.png"));
        assert_eq!(session.phase, FlowPhase::ImageUploaded);
        assert!(session.last_report.unwrap().contains("a slow answer"));
        assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_and_their_images_deleted() {
        let (tmp, state, router) = app_with(CannedClient::ok("unused"));
        router
            .clone()
            .oneshot(upload_request(Some("session_id=idle"), "left.jpg", b"\xff\xd8\xff"))
            .await
            .unwrap();
        let abandoned = state.sessions.snapshot("idle").await.current_image_path.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        router
            .oneshot(upload_request(Some("session_id=active"), "kept.jpg", b"\xff\xd8\xff"))
            .await
            .unwrap();

        let evicted = evict_idle_sessions(&state, std::time::Duration::from_millis(20)).await;

        assert_eq!(evicted, 1);
        assert!(!abandoned.exists());
        assert_eq!(state.sessions.active_sessions(), 1);
        assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 1);
        assert!(state.sessions.snapshot("active").await.current_image_path.unwrap().exists());
    }

    #[tokio::test]
    async fn sweeper_expires_sessions_in_background() {
        let (_tmp, state, router) = app_with(CannedClient::ok("unused"));
        router
            .oneshot(upload_request(Some("session_id=gone"), "left.jpg", b"\xff\xd8\xff"))
            .await
            .unwrap();
        let abandoned = state.sessions.snapshot("gone").await.current_image_path.unwrap();

        let sweeper = spawn_session_sweeper(state.clone(), std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        sweeper.abort();

        assert!(!abandoned.exists());
        assert_eq!(state.sessions.active_sessions(), 0);
    }
}
