//! 上传处理
//!
//! 先校验全部文件，再统一写入 `uploads/<会话ID>/`，最后创建会话

use axum::body::Bytes;
use axum::extract::Multipart;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::error::UploadError;
use crate::models::{FormCode, ProcessingMode};
use crate::orchestrator::SessionStore;

/// 上传接口返回内容
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub files: Vec<String>,
    pub mode: ProcessingMode,
}

/// 一个待写入的上传文件
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// multipart 表单内容
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<(String, Bytes)>,
    pub mode: String,
    /// 是否出现过文件字段（包括文件名为空的）
    pub saw_file_field: bool,
}

/// 读取 multipart：`files` 或 `files[]` 为文件，`mode` 为处理模式
pub async fn read_form(mut multipart: Multipart) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart { message: e.to_string() })?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                form.saw_file_field = true;
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| UploadError::Multipart { message: e.to_string() })?;
                form.files.push((filename, data));
            }
            "mode" => {
                form.mode = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Multipart { message: e.to_string() })?;
            }
            _ => {}
        }
    }

    Ok(form)
}

/// 校验上传内容，返回清洗后的文件和处理模式
///
/// 任何一个文件不合法则整个请求失败，不写入任何文件。
pub fn validate(form: UploadForm) -> Result<(Vec<UploadedFile>, ProcessingMode), UploadError> {
    if !form.saw_file_field {
        return Err(UploadError::NoFiles);
    }

    let named: Vec<_> = form
        .files
        .into_iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .collect();
    if named.is_empty() {
        return Err(UploadError::NoFilesSelected);
    }

    let mut files = Vec::with_capacity(named.len());
    let mut seen = HashSet::new();
    for (original, data) in named {
        let filename = sanitize_filename(&original);
        FormCode::from_filename(&filename)?;
        if !seen.insert(filename.clone()) {
            return Err(UploadError::DuplicateFilename { original, filename });
        }
        files.push(UploadedFile { filename, data });
    }

    let mode = ProcessingMode::parse(&form.mode)?;
    Ok((files, mode))
}

/// 文件名清洗：只保留最后一段路径，非字母数字及 `._-` 以外的字符替换为 `_`
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// 写入文件并创建会话
pub async fn store_upload(
    store: &SessionStore,
    upload_dir: &Path,
    files: Vec<UploadedFile>,
    mode: ProcessingMode,
) -> ApiResult<UploadResponse> {
    let session_id = Uuid::new_v4().to_string();
    let session_dir = upload_dir.join(&session_id);
    tokio::fs::create_dir_all(&session_dir).await?;

    let mut names = Vec::with_capacity(files.len());
    for file in files {
        tokio::fs::write(session_dir.join(&file.filename), &file.data).await?;
        names.push(file.filename);
    }

    store
        .insert_session(session_id.clone(), names.clone(), session_dir, mode)
        .await?;
    info!("📤 已上传 {} 个文件，会话 {}", names.len(), session_id);

    Ok(UploadResponse {
        session_id,
        files: names,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(names: &[&str], mode: &str) -> UploadForm {
        UploadForm {
            files: names
                .iter()
                .map(|n| (n.to_string(), Bytes::from_static(b"%PDF")))
                .collect(),
            mode: mode.to_string(),
            saw_file_field: true,
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("ABCD form.pdf"), "ABCD_form.pdf");
        assert_eq!(sanitize_filename("../../etc/ABCD.pdf"), "ABCD.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\WXYZ.PDF"), "WXYZ.PDF");
        assert_eq!(sanitize_filename(".hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("Äbcd.pdf"), "Äbcd.pdf");
    }

    #[test]
    fn test_validate_accepts_valid_files() {
        let (files, mode) = validate(form(&["ABCD.pdf", "WXYZ_form.PDF"], "batch")).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(mode, ProcessingMode::Batch);
    }

    #[test]
    fn test_validate_rejects() {
        assert!(matches!(
            validate(UploadForm::default()),
            Err(UploadError::NoFiles)
        ));
        assert!(matches!(
            validate(form(&["", " "], "")),
            Err(UploadError::NoFilesSelected)
        ));
        assert!(matches!(
            validate(form(&["ABCD.pdf", "notes.txt"], "")),
            Err(UploadError::InvalidFileType { .. })
        ));
        assert!(matches!(
            validate(form(&["1bcd.pdf"], "")),
            Err(UploadError::InvalidFilenameFormat { .. })
        ));
        assert!(matches!(
            validate(form(&["ABCD.pdf", "ABCD.pdf"], "")),
            Err(UploadError::DuplicateFilename { .. })
        ));
        assert!(matches!(
            validate(form(&["ABCD x.pdf", "ABCD_x.pdf"], "")),
            Err(UploadError::DuplicateFilename { .. })
        ));
        assert!(matches!(
            validate(form(&["ABCD.pdf"], "parallel")),
            Err(UploadError::InvalidMode { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_upload_writes_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new();
        let (files, mode) = validate(form(&["ABCD.pdf"], "single")).unwrap();

        let response = store_upload(&store, dir.path(), files, mode).await.unwrap();

        assert_eq!(response.files, vec!["ABCD.pdf".to_string()]);
        assert!(dir.path().join(&response.session_id).join("ABCD.pdf").exists());
        assert!(store.get_progress(&response.session_id).await.is_ok());
    }
}
