//! 文件上传 API 处理器
//!
//! multipart 上传头像、封面和帖子媒体，落盘到本地目录后返回可
//! 访问的 URL。文件名使用 UUID 重写，原始文件名只保留扩展名。

use axum::{
    Json,
    extract::{Multipart, State},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{ApiResponse, UploadDto},
    error::ApiError,
    state::AppState,
};

/// 允许的内容类型及其扩展名
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("application/pdf", "pdf"),
];

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

/// 上传文件
///
/// POST /api/uploads
///
/// 取 multipart 中第一个名为 file 的字段
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadDto>>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::FileProcessingError(format!("multipart 解析失败: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .ok_or_else(|| ApiError::FileProcessingError("缺少 Content-Type".to_string()))?;

        let ext = extension_for(&content_type)
            .ok_or_else(|| ApiError::UnsupportedMediaType(content_type.clone()))?;

        let original_name = field.file_name().unwrap_or("file").to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::FileProcessingError(format!("读取文件失败: {}", e)))?;

        if bytes.is_empty() {
            return Err(ApiError::FileProcessingError("文件内容为空".to_string()));
        }
        if bytes.len() > state.upload_config.max_size_bytes {
            return Err(ApiError::PayloadTooLarge);
        }

        let file_name = format!("{}.{}", Uuid::now_v7(), ext);
        let dir = std::path::Path::new(&state.upload_config.dir);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ApiError::FileProcessingError(format!("创建上传目录失败: {}", e)))?;
        tokio::fs::write(dir.join(&file_name), &bytes)
            .await
            .map_err(|e| ApiError::FileProcessingError(format!("写入文件失败: {}", e)))?;

        let url = format!(
            "{}/{}",
            state.upload_config.base_url.trim_end_matches('/'),
            file_name
        );

        info!(file = %file_name, original = %original_name, size = bytes.len(), "文件上传完成");

        return Ok(Json(ApiResponse::success(UploadDto {
            url,
            file_name,
            content_type,
            size_bytes: bytes.len(),
        })));
    }

    Err(ApiError::FileProcessingError(
        "请求中没有名为 file 的字段".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("video/mp4"), Some("mp4"));
        assert_eq!(extension_for("text/html"), None);
        assert_eq!(extension_for("application/octet-stream"), None);
    }
}
