//! In-process stand-in for the device's upload server

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Recorded {
    upload_status: StatusCode,
    requests: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<Vec<String>>>>,
}

async fn receive_upload(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let compressed = headers
        .get("content-type")
        .map(|v| v.as_bytes() == b"application/gzip")
        .unwrap_or(false);
    rec.requests.lock().unwrap().push("/app-upload".to_string());
    rec.uploads.lock().unwrap().push(entry_names(&body, compressed));
    rec.upload_status
}

async fn receive_restart(State(rec): State<Recorded>) -> StatusCode {
    rec.requests.lock().unwrap().push("/restart".to_string());
    StatusCode::OK
}

/// Mock device answering uploads with a fixed status
pub struct MockDevice {
    pub url: String,
    recorded: Recorded,
}

impl MockDevice {
    pub async fn start(upload_status: StatusCode) -> Self {
        let recorded = Recorded {
            upload_status,
            ..Recorded::default()
        };

        let app = Router::new()
            .route("/app-upload", post(receive_upload))
            .route("/restart", post(receive_restart))
            .with_state(recorded.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://127.0.0.1:{}", port),
            recorded,
        }
    }

    /// Paths of every request received, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.recorded.requests.lock().unwrap().clone()
    }

    /// Entry names of every archive received, in arrival order
    pub fn uploads(&self) -> Vec<Vec<String>> {
        self.recorded.uploads.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> usize {
        self.requests().iter().filter(|path| *path == "/restart").count()
    }
}

fn entry_names(body: &[u8], compressed: bool) -> Vec<String> {
    let reader: Box<dyn Read + '_> = if compressed {
        Box::new(GzDecoder::new(body))
    } else {
        Box::new(body)
    };

    let mut archive = tar::Archive::new(reader);
    let mut names = Vec::new();
    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        names.push(entry.path().unwrap().to_string_lossy().replace('\\', "/"));
    }
    names
}
