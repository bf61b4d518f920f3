//! 表单处理上下文
//!
//! 封装"我正在处理哪个会话的第几个文件"这一信息

use std::fmt::Display;
use std::path::PathBuf;

use crate::models::FormCode;

/// 表单处理上下文
#[derive(Debug, Clone)]
pub struct FormCtx {
    /// 会话ID
    pub session_id: String,

    /// 文件在会话中的索引（从0开始）
    pub file_index: usize,

    /// 会话中的文件总数
    pub total_files: usize,

    pub filename: String,

    pub form_code: FormCode,

    /// 上传文件的完整路径
    pub input_path: PathBuf,
}

impl FormCtx {
    pub fn new(
        session_id: String,
        file_index: usize,
        total_files: usize,
        filename: String,
        form_code: FormCode,
        input_path: PathBuf,
    ) -> Self {
        Self {
            session_id,
            file_index,
            total_files,
            filename,
            form_code,
            input_path,
        }
    }
}

impl Display for FormCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short_id: String = self.session_id.chars().take(8).collect();
        write!(
            f,
            "[会话 {} 文件 {}/{} 表单 {}]",
            short_id,
            self.file_index + 1,
            self.total_files,
            self.form_code
        )
    }
}
