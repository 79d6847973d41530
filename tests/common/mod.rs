//! Shared helpers for the integration tests: a local HTTP server standing in
//! for the KNMI open data API and the Domoticz JSON API.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Response, Server};

pub const WEEKDAYS: [&str; 7] = ["Ma", "Di", "Wo", "Do", "Vr", "Za", "Zo"];

/// One request as the fake server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Path plus query string.
    pub url: String,
    pub authorization: Option<String>,
}

/// Route handler: `(base_url, path_and_query)` to `(status, body)`.
pub type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

pub struct FakeServer {
    server: Arc<Server>,
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    worker: Option<JoinHandle<()>>,
}

impl FakeServer {
    pub fn start(handler: impl Fn(&str, &str) -> (u16, String) + Send + Sync + 'static) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind fake server"));
        let addr = server.server_addr().to_ip().expect("fake server has an IP address");
        let base_url = format!("http://{}", addr);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            let base_url = base_url.clone();
            let handler: Box<Handler> = Box::new(handler);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let authorization = request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv("Authorization"))
                        .map(|h| h.value.as_str().to_string());
                    let url = request.url().to_string();
                    requests.lock().unwrap().push(Recorded {
                        url: url.clone(),
                        authorization,
                    });

                    let (status, body) = handler(&base_url, &url);
                    let content_type =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                    let response = Response::from_string(body)
                        .with_status_code(status)
                        .with_header(content_type);
                    let _ = request.respond(response);
                }
            })
        };

        FakeServer {
            server,
            base_url,
            requests,
            worker: Some(worker),
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded paths that start with `prefix`, query strings included.
    pub fn paths_starting_with(&self, prefix: &str) -> Vec<String> {
        self.recorded()
            .into_iter()
            .map(|r| r.url)
            .filter(|u| u.starts_with(prefix))
            .collect()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {}: {}", path, e))
}

pub fn weekdays() -> Vec<String> {
    WEEKDAYS.map(String::from).to_vec()
}

/// Open data API routes serving `documents` by filename.
///
/// `.../files/{name}/url` answers with a temporary URL on the same server,
/// `/download/{name}` with the document body. Unknown names get a 404.
pub fn open_data_routes(
    documents: Vec<(&'static str, String)>,
) -> impl Fn(&str, &str) -> (u16, String) + Send + Sync + 'static {
    move |base, path| {
        if let Some(rest) = path.strip_prefix("/download/") {
            return match documents.iter().find(|(name, _)| *name == rest) {
                Some((_, body)) => (200, body.clone()),
                None => (404, String::new()),
            };
        }
        if let Some(name) = path.strip_suffix("/url").and_then(|p| p.rsplit('/').next()) {
            if documents.iter().any(|(n, _)| *n == name) {
                let body = format!(r#"{{"temporaryDownloadUrl":"{}/download/{}"}}"#, base, name);
                return (200, body);
            }
        }
        (404, r#"{"message":"not found"}"#.to_string())
    }
}

/// Query parameter `key` from a recorded path, percent-decoded.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(&format!("http://fake{}", url)).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
