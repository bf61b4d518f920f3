use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::error::UploadError;
use crate::models::step::Step;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl SessionStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Error | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 处理模式（单文件 / 批量）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Single,
    Batch,
}

impl ProcessingMode {
    pub fn parse(value: &str) -> Result<Self, UploadError> {
        match value.trim() {
            "" | "single" => Ok(ProcessingMode::Single),
            "batch" => Ok(ProcessingMode::Batch),
            other => Err(UploadError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// 成功处理的文件摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub filename: String,
    pub form_code: String,
    pub page_count: u64,
    pub num_sections: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub package_name: String,
    pub json_file: String,
    /// 相对输出目录的下载路径
    pub package_file: String,
}

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileResult {
    Completed(FileSummary),
    Error { filename: String, error: String },
}

impl FileResult {
    pub fn filename(&self) -> &str {
        match self {
            FileResult::Completed(summary) => &summary.filename,
            FileResult::Error { filename, .. } => filename,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, FileResult::Completed(_))
    }
}

/// 会话记录：由会话仓库持有，只由处理它的那个 worker 修改
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub files: Vec<String>,
    pub input_dir: PathBuf,
    pub mode: ProcessingMode,
    pub current_file_index: usize,
    pub current_file: Option<String>,
    pub current_step: usize,
    pub progress: f64,
    pub status: SessionStatus,
    pub results: Vec<FileResult>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub started_at: Instant,
}

impl SessionRecord {
    pub fn new(session_id: String, files: Vec<String>, input_dir: PathBuf, mode: ProcessingMode) -> Self {
        Self {
            session_id,
            files,
            input_dir,
            mode,
            current_file_index: 0,
            current_file: None,
            current_step: 0,
            progress: 0.0,
            status: SessionStatus::Pending,
            results: Vec::new(),
            error_message: None,
            cancel_requested: false,
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            mode: self.mode,
            total_files: self.files.len(),
            current_file_index: self.current_file_index,
            current_file: self.current_file.clone(),
            current_step: self.current_step,
            total_steps: Step::COUNT,
            steps: Step::labels(),
            progress: self.progress,
            status: self.status,
            elapsed_time: self.started_at.elapsed().as_secs(),
            results: self.results.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// 轮询接口返回的会话快照
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub mode: ProcessingMode,
    pub total_files: usize,
    pub current_file_index: usize,
    pub current_file: Option<String>,
    pub current_step: usize,
    pub total_steps: usize,
    pub steps: Vec<&'static str>,
    pub progress: f64,
    pub status: SessionStatus,
    pub elapsed_time: u64,
    pub results: Vec<FileResult>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_mode_parse() {
        assert_eq!(ProcessingMode::parse("").unwrap(), ProcessingMode::Single);
        assert_eq!(ProcessingMode::parse("batch").unwrap(), ProcessingMode::Batch);
        assert!(ProcessingMode::parse("parallel").is_err());
    }

    #[test]
    fn test_file_result_serialization_is_tagged() {
        let error = FileResult::Error {
            filename: "ABCD.pdf".to_string(),
            error: "boom".to_string(),
        };
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["filename"], "ABCD.pdf");

        let completed = FileResult::Completed(FileSummary {
            filename: "ABCD.pdf".to_string(),
            form_code: "ABCD".to_string(),
            page_count: 3,
            num_sections: 2,
            total_tokens: 500,
            total_cost: 0.005,
            package_name: "ABCD_SANDBOX".to_string(),
            json_file: "ABCD_input_for_af.json".to_string(),
            package_file: "generated_AF/ABCD_SANDBOX.zip".to_string(),
        });
        let value = serde_json::to_value(&completed).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["form_code"], "ABCD");
    }

    #[test]
    fn test_snapshot_reports_steps() {
        let record = SessionRecord::new(
            "s1".to_string(),
            vec!["ABCD.pdf".to_string()],
            PathBuf::from("uploads/s1"),
            ProcessingMode::Single,
        );
        let snapshot = record.snapshot();
        assert_eq!(snapshot.total_steps, 7);
        assert_eq!(snapshot.steps.len(), 7);
        assert_eq!(snapshot.status, SessionStatus::Pending);
        assert_eq!(snapshot.total_files, 1);
    }
}
