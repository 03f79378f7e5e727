//! 一次性密钥上传：校验并占用密钥、解析 multipart 表单、落盘文件。

use axum::extract::multipart::{Field, Multipart, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query};
use axum::response::Json as JsonResponse;
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::atomic::AtomicFile;
use crate::config::UPLOAD_FIELD_NAME;
use crate::error::ApiError;
use crate::keys::KeyStore;
use crate::storage::Storage;

#[derive(Debug)]
pub struct UploadConfig {
    /// 非文件表单字段的字节上限，0 表示不限制。文件字段不受此限制。
    pub max_field_size: u64,
}

#[derive(Deserialize)]
pub(crate) struct UploadQuery {
    key: Option<String>,
}

/// 上传成功后返回的文件描述。
#[derive(Debug, Serialize)]
pub struct StoredFile {
    pub path: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub name: String,
    pub size: u64,
}

/// 使用一次性密钥上传单个文件；只有成功才会作废密钥。
pub async fn upload_file(
    query: Result<Query<UploadQuery>, QueryRejection>,
    Extension(keys): Extension<Arc<KeyStore>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<StoredFile>, ApiError> {
    // 重复或无法解析的 key 参数一律视为无效密钥。
    let key = match query {
        Ok(Query(UploadQuery { key })) => key.unwrap_or_default(),
        Err(err) => {
            warn!(error = %err, "upload rejected: malformed query");
            return Err(ApiError::InvalidToken);
        }
    };
    let Some(lease) = keys.lease(&key) else {
        warn!(key, "upload rejected: invalid key");
        return Err(ApiError::InvalidToken);
    };

    let multipart = multipart.map_err(|err| {
        warn!(error = %err, "upload rejected: not a multipart form");
        ApiError::FormParse(err.body_text())
    })?;

    let stored = match receive_form(&storage, &upload, multipart).await {
        Ok(stored) => stored,
        Err(err) => {
            warn!(key = lease.key(), reason = err.kind(), "upload failed, key stays valid");
            return Err(err);
        }
    };

    lease.consume();
    info!(
        path = stored.path,
        name = stored.name,
        size = stored.size,
        "file uploaded"
    );
    Ok(JsonResponse(stored))
}

/// 已落盘、但表单尚未读完的文件。未确认就被丢弃（解析失败或请求中断）时删除。
struct PendingFile {
    target: Option<PathBuf>,
}

impl PendingFile {
    fn keep(mut self) {
        self.target = None;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            debug!(path = %target.display(), "discarding stored file");
            let _ = std::fs::remove_file(target);
        }
    }
}

/// 解析整个表单：第一个带文件名的 `file` 字段落盘，其余字段读取后丢弃。
async fn receive_form(
    storage: &Storage,
    upload: &UploadConfig,
    mut multipart: Multipart,
) -> Result<StoredFile, ApiError> {
    let mut stored: Option<(StoredFile, PendingFile)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::FormParse(err.body_text()))?
    {
        let is_file = field.name() == Some(UPLOAD_FIELD_NAME) && field.file_name().is_some();
        if is_file && stored.is_none() {
            let file = persist_field(storage, field).await?;
            let pending = PendingFile {
                target: Some(storage.root_path().join(&file.path)),
            };
            stored = Some((file, pending));
        } else {
            drain_field(upload, field).await?;
        }
    }

    let (file, pending) = stored.ok_or(ApiError::MissingFileField)?;
    pending.keep();
    Ok(file)
}

async fn persist_field(storage: &Storage, mut field: Field<'_>) -> Result<StoredFile, ApiError> {
    let name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let path = storage.stored_name(&name);
    let target = storage.root_path().join(&path);

    let mut atomic = AtomicFile::new(&target)
        .await
        .map_err(|err| ApiError::FormParse(err.to_string()))?;
    let write_result: Result<(), ApiError> = async {
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|err| ApiError::FormParse(err.body_text()))?;
            if chunk.is_empty() {
                continue;
            }
            atomic
                .write_chunk(&chunk)
                .await
                .map_err(|err| ApiError::FormParse(err.to_string()))?;
        }
        Ok(())
    }
    .await;
    if let Err(err) = write_result {
        atomic.cleanup().await;
        return Err(err);
    }
    let size = atomic
        .finalize()
        .await
        .map_err(|err| ApiError::FormParse(err.to_string()))?;

    debug!(path, size, "upload field stored");
    Ok(StoredFile {
        path,
        content_type,
        name,
        size,
    })
}

async fn drain_field(upload: &UploadConfig, mut field: Field<'_>) -> Result<(), ApiError> {
    let mut total: u64 = 0;
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|err| ApiError::FormParse(err.body_text()))?;
        total += chunk.len() as u64;
        if exceeds_limit(upload, total) {
            return Err(ApiError::FormParse("form field exceeds size limit".into()));
        }
    }
    Ok(())
}

fn exceeds_limit(upload: &UploadConfig, size: u64) -> bool {
    upload.max_field_size > 0 && size > upload.max_field_size
}
