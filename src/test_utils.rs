//! Shared helpers for handler and router tests.

use axum::body::{Body, Bytes};
use axum::http::{Request, header};
use axum::response::Response;
use futures_util::stream::{self, StreamExt};
use http_body_util::BodyExt;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::auth::AuthConfig;
use crate::keys::KeyStore;
use crate::storage::Storage;
use crate::upload::UploadConfig;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const BOUNDARY: &str = "keydrop-test-boundary";

pub struct TestContext {
    pub temp: TempDir,
    pub storage: Arc<Storage>,
    pub keys: Arc<KeyStore>,
    pub auth: Arc<AuthConfig>,
    pub upload: Arc<UploadConfig>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_limit(crate::config::DEFAULT_MAX_FIELD_SIZE)
    }

    pub fn with_limit(max_field_size: u64) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create upload dir");
        Self {
            temp,
            storage: Arc::new(Storage::new(root, false)),
            keys: Arc::new(KeyStore::new(Duration::ZERO)),
            auth: Arc::new(AuthConfig {
                admin_token: ADMIN_TOKEN.to_string(),
            }),
            upload: Arc::new(UploadConfig { max_field_size }),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        self.storage.root_path()
    }

    /// Names of the regular files in the upload directory, hidden temp files included.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.upload_dir())
            .expect("read upload dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "file",
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    multipart_request_from(uri, Body::from(body))
}

pub fn multipart_request_from(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .expect("request")
}

/// A streaming body that yields `head` at once and `tail` only after `release` resolves.
pub fn held_body<F>(head: Vec<u8>, tail: Vec<u8>, release: F) -> Body
where
    F: Future<Output = ()> + Send + 'static,
{
    let head = stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(head)) });
    let tail = stream::once(async move {
        release.await;
        Ok(Bytes::from(tail))
    });
    Body::from_stream(head.chain(tail))
}

pub async fn body_bytes(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("json body")
}
