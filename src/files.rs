//! 文件下载与删除处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use serde::Serialize;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::auth::AuthConfig;
use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::storage::Storage;

#[derive(Serialize)]
pub(crate) struct DeleteResponse {
    status: &'static str,
    message: &'static str,
}

/// 下载文件（公开），支持单段 Range 与条件请求。
pub async fn get_file(
    Path(path): Path<String>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    info!(path, "file requested");
    let target = storage.resolve(&path).await?;
    if !storage.exists(&target).await {
        info!(path, "requested file does not exist");
        return Err(ApiError::FileNotFound);
    }
    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| ApiError::ReadFailed(err.to_string()))?;
    if metadata.is_dir() {
        return Err(ApiError::FileNotFound);
    }

    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mime = mime_guess::from_path(&target).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    insert_header(&mut response_headers, header::ETAG, &etag)?;
    if let Some(modified) = modified {
        insert_header(
            &mut response_headers,
            header::LAST_MODIFIED,
            &fmt_http_date(modified),
        )?;
    }

    if is_not_modified(&request_headers, &etag, modified) {
        debug!(path, "file not modified");
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    insert_header(&mut response_headers, header::CONTENT_TYPE, mime.essence_str())?;
    let range = parse_range(request_headers.get(header::RANGE), file_size)?;

    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::ReadFailed(err.to_string()))?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(path, start, end, length, "range request accepted");
        let mut file = file;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::ReadFailed(err.to_string()))?;
        let stream = ReaderStream::new(file.take(length));
        insert_header(
            &mut response_headers,
            header::CONTENT_RANGE,
            &format!("bytes {start}-{end}/{file_size}"),
        )?;
        insert_header(
            &mut response_headers,
            header::CONTENT_LENGTH,
            &length.to_string(),
        )?;
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    insert_header(
        &mut response_headers,
        header::CONTENT_LENGTH,
        &file_size.to_string(),
    )?;
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// 删除文件，需要管理令牌。
pub async fn delete_file(
    Path(path): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<DeleteResponse>, ApiError> {
    if let Err(err) = auth.authorize(&headers) {
        warn!(path, reason = err.kind(), "delete rejected");
        return Err(err);
    }

    let target = storage.resolve(&path).await.map_err(|err| match ApiError::from(err) {
        ApiError::ReadFailed(detail) => ApiError::DeleteFailed(detail),
        other => other,
    })?;
    if !storage.exists(&target).await {
        info!(path, "delete failed: file not found");
        return Err(ApiError::FileNotFound);
    }
    if let Err(err) = fs::remove_file(&target).await {
        warn!(path, error = %err, "delete failed");
        return Err(ApiError::DeleteFailed(err.to_string()));
    }

    info!(path, "file deleted");
    Ok(JsonResponse(DeleteResponse {
        status: "ok",
        message: "File deleted",
    }))
}

fn insert_header(
    headers: &mut HeaderMap,
    name: header::HeaderName,
    value: &str,
) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| ApiError::ReadFailed(format!("invalid {name} header value")))?;
    headers.insert(name, value);
    Ok(())
}

/// 解析单段 `Range: bytes=` 头。格式不合法时忽略（返回整个文件），越界返回 416。
fn parse_range(value: Option<&HeaderValue>, file_size: u64) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(range) = value
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if range.contains(',') {
        return Ok(None);
    }

    let Some((start_part, end_part)) = range.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    let (start, end) = if start_part.is_empty() {
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || file_size == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let Ok(start) = start_part.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_part.is_empty() {
            file_size.saturating_sub(1)
        } else {
            match end_part.parse::<u64>() {
                Ok(end) => end.min(file_size.saturating_sub(1)),
                Err(_) => return Ok(None),
            }
        };
        (start, end)
    };

    if start >= file_size || start > end {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    Ok(Some((start, end)))
}
