use std::path::{Path, PathBuf};
use std::time::Duration;

/// 单个文件处理失败时的策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// 记录错误结果，继续处理下一个文件（HTTP 默认）
    ContinueOnError,
    /// 立即中止整个会话（命令行默认）
    AbortBatch,
}

impl FailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" | "continue_on_error" => Some(Self::ContinueOnError),
            "abort" | "abort_batch" => Some(Self::AbortBatch),
            _ => None,
        }
    }
}

/// 区段提取后端
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractorBackend {
    /// 模拟提取（固定样例字段）
    Simulated,
    /// 兼容 OpenAI 的对话接口
    Llm,
}

impl ExtractorBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Some(Self::Simulated),
            "llm" | "openai" => Some(Self::Llm),
            _ => None,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 上传文件目录（每个会话一个子目录）
    pub upload_dir: PathBuf,
    /// 输出根目录
    pub outputs_dir: PathBuf,
    /// 打包模式配置文件
    pub packager_config_path: PathBuf,
    /// 密钥文件
    pub secrets_path: PathBuf,
    /// 同时处理的会话数量
    pub max_concurrent_sessions: usize,
    /// 等待队列容量
    pub queue_capacity: usize,
    /// 单个步骤的超时时间（秒）
    pub step_timeout_secs: u64,
    /// 模拟延迟倍率，0 表示不等待
    pub simulated_latency_scale: f64,
    /// 文件失败策略
    pub failure_policy: FailurePolicy,
    /// 区段提取后端
    pub extractor_backend: ExtractorBackend,
    /// LLM 每千 token 的费用
    pub llm_cost_per_1k_tokens: f64,
    /// 单次上传的最大字节数
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            upload_dir: PathBuf::from("uploads"),
            outputs_dir: PathBuf::from("outputs"),
            packager_config_path: PathBuf::from(".config"),
            secrets_path: PathBuf::from("secrets.json"),
            max_concurrent_sessions: 4,
            queue_capacity: 64,
            step_timeout_secs: 300,
            simulated_latency_scale: 1.0,
            failure_policy: FailurePolicy::ContinueOnError,
            extractor_backend: ExtractorBackend::Simulated,
            llm_cost_per_1k_tokens: 0.01,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(default.host),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.port),
            upload_dir: std::env::var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(default.upload_dir),
            outputs_dir: std::env::var("OUTPUTS_DIR").map(PathBuf::from).unwrap_or(default.outputs_dir),
            packager_config_path: std::env::var("PACKAGER_CONFIG_PATH").map(PathBuf::from).unwrap_or(default.packager_config_path),
            secrets_path: std::env::var("SECRETS_PATH").map(PathBuf::from).unwrap_or(default.secrets_path),
            max_concurrent_sessions: std::env::var("MAX_CONCURRENT_SESSIONS").ok().and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(default.max_concurrent_sessions),
            queue_capacity: std::env::var("QUEUE_CAPACITY").ok().and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(default.queue_capacity),
            step_timeout_secs: std::env::var("STEP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.step_timeout_secs),
            simulated_latency_scale: std::env::var("SIMULATED_LATENCY_SCALE").ok().and_then(|v| v.parse().ok()).filter(|s: &f64| *s >= 0.0).unwrap_or(default.simulated_latency_scale),
            failure_policy: std::env::var("FAILURE_POLICY").ok().and_then(|v| FailurePolicy::parse(&v)).unwrap_or(default.failure_policy),
            extractor_backend: std::env::var("EXTRACTOR_BACKEND").ok().and_then(|v| ExtractorBackend::parse(&v)).unwrap_or(default.extractor_backend),
            llm_cost_per_1k_tokens: std::env::var("LLM_COST_PER_1K_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_cost_per_1k_tokens),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_upload_bytes),
        }
    }

    /// 将所有相对目录挂到 `root` 之下
    pub fn with_root(mut self, root: &Path) -> Self {
        self.upload_dir = root.join(&self.upload_dir);
        self.outputs_dir = root.join(&self.outputs_dir);
        self.packager_config_path = root.join(&self.packager_config_path);
        self.secrets_path = root.join(&self.secrets_path);
        self
    }

    pub fn images_dir(&self) -> PathBuf {
        self.outputs_dir.join("images_of_pdfs")
    }

    pub fn json_outputs_dir(&self) -> PathBuf {
        self.outputs_dir.join("json_outputs")
    }

    pub fn generated_af_dir(&self) -> PathBuf {
        self.outputs_dir.join("generated_AF")
    }

    pub fn summary_csv_path(&self) -> PathBuf {
        self.outputs_dir.join("form_summary.csv")
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs.max(1))
    }

    /// 创建所有输出目录
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.upload_dir.clone(),
            self.images_dir(),
            self.json_outputs_dir(),
            self.generated_af_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }
}
