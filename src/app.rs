//! 路由组装：把各处理器、共享状态与中间件装配成一个 `Router`。

use axum::body::Body as AxumBody;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::Router;
use axum::routing::{get, post};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::{self, AuthConfig};
use crate::files;
use crate::http::{build_upload_cors_layer, make_request_span};
use crate::keys::KeyStore;
use crate::storage::Storage;
use crate::upload::{self, UploadConfig};

pub fn build_router(
    storage: Arc<Storage>,
    keys: Arc<KeyStore>,
    auth: Arc<AuthConfig>,
    upload: Arc<UploadConfig>,
) -> Router {
    Router::new()
        .route("/key", post(auth::issue_key))
        .route(
            "/files",
            post(upload::upload_file)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer(build_upload_cors_layer()),
        )
        .route(
            "/files/{path}",
            get(files::get_file).delete(files::delete_file),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<AxumBody>| make_request_span(request))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(keys))
        .layer(Extension(auth))
        .layer(Extension(upload))
}
