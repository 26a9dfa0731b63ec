//! Integration tests for the roster upload + send endpoints.
//!
//! Each test spins up an Axum server on a random port with a recording mail
//! transport, then drives the real HTTP contract with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use roster_mailer::config::{DispatchConfig, UploadLimits};
use roster_mailer::error::TransportError;
use roster_mailer::notify::{MailTransport, Notifier, RenderedBody};
use roster_mailer::roster::RosterLoader;
use roster_mailer::store::MemoryBatchStore;
use roster_mailer::web::{AppState, SESSION_COOKIE, UPLOAD_FIELD, roster_routes, session_layer};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const SESSION_TTL: Duration = Duration::from_secs(3600);

const ROSTER_CSV: &str = "\
Name,Email,Emp Code,Area,Location-Delhi,Pickup Time,Contact No.,Process
Asha,asha@example.com,E100,North,Rohini,08:30,98100,Billing
Ravi,ravi.example.com,E101,South,Saket,09:00,98101,Support
Meera,meera@example.com,E102,,Dwarka,09:30,98102,Claims
";

/// Transport double that records recipients instead of talking SMTP.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, to: &str, subject: &str, body: &RenderedBody) -> Result<(), TransportError> {
        assert_eq!(subject, "Updated Roster");
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.content.clone()));
        Ok(())
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    transport: Arc<RecordingTransport>,
}

/// Start an Axum server on a random port.
async fn start_server(limits: UploadLimits) -> TestServer {
    let transport = Arc::new(RecordingTransport::default());
    let state = AppState::new(
        MemoryBatchStore::new(SESSION_TTL),
        RosterLoader::new(limits),
        Notifier::new(&DispatchConfig::default(), Arc::clone(&transport) as Arc<dyn MailTransport>),
    );
    let app = roster_routes(state, session_layer(SESSION_TTL));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        transport,
    }
}

/// `name=value` part of the session cookie set by the server.
fn session_cookie(resp: &reqwest::Response) -> String {
    resp.headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .filter(|pair| pair.starts_with(&format!("{SESSION_COOKIE}=")))
        .expect("server must set a session cookie")
        .to_string()
}

impl TestServer {
    async fn upload(&self, cookie: Option<&str>, filename: &str, body: &[u8]) -> (StatusCode, String, Value) {
        let form = Form::new().part(
            UPLOAD_FIELD,
            Part::bytes(body.to_vec()).file_name(filename.to_string()),
        );
        let mut req = self.client.post(format!("{}/roster", self.base)).multipart(form);
        if let Some(cookie) = cookie {
            req = req.header("cookie", cookie);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let cookie = session_cookie(&resp);
        (status, cookie, resp.json().await.unwrap())
    }

    async fn show(&self, cookie: &str) -> Value {
        let resp = self
            .client
            .get(format!("{}/roster", self.base))
            .header("cookie", cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    async fn send(&self, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}/roster/send", self.base));
        if let Some(cookie) = cookie {
            req = req.header("cookie", cookie);
        }
        let resp = req.send().await.unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    fn recipients(&self) -> Vec<String> {
        let mut to: Vec<String> = self
            .transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect();
        to.sort();
        to
    }
}

// ── Upload + send ────────────────────────────────────────────────────

#[tokio::test]
async fn three_row_roster_sends_two_of_three() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;

        let (status, cookie, body) = server.upload(None, "roster.csv", ROSTER_CSV.as_bytes()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "File uploaded and processed successfully!");
        assert_eq!(body["batch"]["row_count"], 3);

        let (status, body) = server.send(Some(&cookie)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success_count"], 2);
        assert_eq!(body["total_count"], 3);
        assert_eq!(
            body["message"],
            "Email sending completed. 2/3 emails sent successfully."
        );
        assert_eq!(body["outcomes"][1]["status"], "invalid_address");
        assert_eq!(body["outcomes"][1]["recipient"], "ravi.example.com");

        // The malformed address never reached the transport.
        assert_eq!(
            server.recipients(),
            vec!["asha@example.com".to_string(), "meera@example.com".to_string()]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sent_body_is_personalized() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;
        let (_, cookie, _) = server.upload(None, "roster.csv", ROSTER_CSV.as_bytes()).await;
        server.send(Some(&cookie)).await;

        let sent = server.transport.sent.lock().unwrap().clone();
        let (_, meera_body) = sent
            .iter()
            .find(|(to, _)| to == "meera@example.com")
            .expect("meera was emailed");
        assert!(meera_body.starts_with("Dear Meera,"));
        assert!(meera_body.contains("Area: N/A"));
        assert!(meera_body.contains("Pickup Time: 09:30"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn send_without_upload_reports_no_data() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;

        let (status, body) = server.send(None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "no_batch");
        assert_eq!(body["message"], "No data found. Please upload a valid file first.");
        assert!(server.recipients().is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Upload failures ──────────────────────────────────────────────────

#[tokio::test]
async fn header_only_csv_is_empty_and_not_stored() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;

        let (status, cookie, body) = server
            .upload(None, "roster.csv", b"Name,Email,Emp Code\n")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "empty_data");
        assert_eq!(body["message"], "The uploaded file contains no data");

        assert!(server.show(&cookie).await["batch"].is_null());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bad_extension_keeps_previous_batch() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;
        let (_, cookie, first) = server.upload(None, "roster.csv", ROSTER_CSV.as_bytes()).await;

        let (status, _, body) = server
            .upload(Some(&cookie), "roster.txt", b"Name\nSomeone\n")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
        assert_eq!(body["batch"], first["batch"]);

        assert_eq!(server.show(&cookie).await["batch"], first["batch"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let limits = UploadLimits {
            max_file_size: 64,
            ..UploadLimits::default()
        };
        let server = start_server(limits).await;

        let (status, cookie, body) = server.upload(None, "roster.csv", ROSTER_CSV.as_bytes()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["kind"], "validation_error");
        assert!(server.show(&cookie).await["batch"].is_null());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;

        let form = Form::new().text("note", "no file here");
        let resp = server
            .client
            .post(format!("{}/roster", server.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "No file uploaded");
    })
    .await
    .expect("test timed out");
}

// ── Stored batch ─────────────────────────────────────────────────────

#[tokio::test]
async fn refetch_returns_last_upload() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;
        let (_, cookie, uploaded) = server.upload(None, "roster.csv", ROSTER_CSV.as_bytes()).await;

        let first = server.show(&cookie).await;
        let second = server.show(&cookie).await;
        assert_eq!(first["batch"], uploaded["batch"]);
        assert_eq!(first, second);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn wide_roster_is_truncated_and_filled() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;

        let header: Vec<String> = (0..32).map(|i| format!("col{i}")).collect();
        let row: Vec<String> = (0..32)
            .map(|i| if i % 2 == 0 { format!("v{i}") } else { String::new() })
            .collect();
        let csv = format!("{}\n{}\n", header.join(","), row.join(","));

        let (status, _, body) = server.upload(None, "wide.csv", csv.as_bytes()).await;
        assert_eq!(status, StatusCode::OK);

        let columns = body["batch"]["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 29);
        assert_eq!(columns[0], "col0");
        assert_eq!(columns[28], "col28");

        let record = &body["batch"]["records"][0];
        assert_eq!(record["col0"], "v0");
        assert_eq!(record["col1"], "N/A");
        assert!(record.get("col29").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sessions_do_not_share_batches() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(UploadLimits::default()).await;
        let (_, cookie_a, _) = server.upload(None, "roster.csv", ROSTER_CSV.as_bytes()).await;

        let (status, body) = server.send(None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "no_batch");

        assert!(!server.show(&cookie_a).await["batch"].is_null());
    })
    .await
    .expect("test timed out");
}
