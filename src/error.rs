use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 会话相关错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 上传校验错误
    #[error("上传错误: {0}")]
    Upload(#[from] UploadError),
    /// 配置 / 密钥文件错误
    #[error("配置错误: {0}")]
    Settings(#[from] SettingsError),
    /// 流水线步骤错误
    #[error("处理错误: {0}")]
    Pipeline(#[from] PipelineError),
    /// 文件读写错误
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
    /// JSON 序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// 会话相关错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话不存在
    #[error("会话不存在: {session_id}")]
    NotFound { session_id: String },
    /// 文件列表为空
    #[error("会话至少需要一个文件")]
    NoFiles,
    /// 会话已经开始或处理完毕
    #[error("会话 {session_id} 已在处理或已完成 (当前状态: {status})")]
    NotPending { session_id: String, status: String },
    /// 会话尚未完成
    #[error("会话 {session_id} 尚未完成 (当前状态: {status})")]
    NotCompleted { session_id: String, status: String },
    /// 会话已经结束，无法取消
    #[error("会话 {session_id} 已结束 (当前状态: {status})")]
    AlreadyFinished { session_id: String, status: String },
    /// 任务队列已满
    #[error("任务队列已满 (容量: {capacity})，请稍后重试")]
    QueueFull { capacity: usize },
    /// 工作池已关闭
    #[error("工作池已关闭")]
    WorkerPoolClosed,
}

/// 上传校验错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 请求中没有文件字段
    #[error("未提供文件")]
    NoFiles,
    /// 文件名全部为空
    #[error("未选择文件")]
    NoFilesSelected,
    /// 扩展名不是 pdf
    #[error("文件类型无效: {filename}")]
    InvalidFileType { filename: String },
    /// 文件名前四个字符不是字母
    #[error("文件名格式无效: {filename}，前 4 个字符必须是字母")]
    InvalidFilenameFormat { filename: String },
    /// 清洗后的文件名重复
    #[error("文件名重复: {original} 与已上传的 {filename} 冲突")]
    DuplicateFilename { original: String, filename: String },
    /// 处理模式无效
    #[error("处理模式无效: {mode} (可选: single, batch)")]
    InvalidMode { mode: String },
    /// multipart 解析失败
    #[error("无法读取上传内容: {message}")]
    Multipart { message: String },
}

/// 配置 / 密钥文件错误
#[derive(Debug, Error)]
pub enum SettingsError {
    /// 打包模式无效
    #[error("打包模式无效: {mode} (可选: sandbox, dev)")]
    InvalidPackagerMode { mode: String },
    /// 密钥文件不存在
    #[error("密钥文件不存在: {path}，请先保存配置")]
    SecretsMissing { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// TOML 序列化失败
    #[error("TOML序列化失败: {0}")]
    TomlWriteFailed(#[from] toml::ser::Error),
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 流水线步骤错误
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 步骤执行失败
    #[error("步骤「{step}」失败: {message}")]
    StepFailed { step: String, message: String },
    /// 步骤超时
    #[error("步骤「{step}」超时 ({timeout_secs} 秒)")]
    StepTimeout { step: String, timeout_secs: u64 },
    /// 会话被取消
    #[error("处理已被取消")]
    Cancelled,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建步骤失败错误
    pub fn step_failed(step: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Pipeline(PipelineError::StepFailed {
            step: step.into(),
            message: message.to_string(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
