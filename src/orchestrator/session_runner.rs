//! 单个会话处理器 - 编排层
//!
//! ## 职责
//!
//! - 会话开始时加载设置（打包模式、密钥）
//! - 按顺序处理会话中的每个文件（委托 `FormFlow`）
//! - 按失败策略决定继续还是中止
//! - 汇总结果和全局统计，设置会话最终状态

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{Config, FailurePolicy};
use crate::error::{AppError, PipelineError};
use crate::models::{FileResult, FormCode, SessionStatus};
use crate::orchestrator::session_store::SessionStore;
use crate::services::Collaborators;
use crate::settings;
use crate::utils::logging;
use crate::workflow::{FormCtx, FormFlow};

/// 会话处理器
#[derive(Clone)]
pub struct SessionRunner {
    config: Config,
    store: Arc<SessionStore>,
    /// 固定的协作方；为 None 时每个会话按设置选择
    collaborators: Option<Collaborators>,
}

impl SessionRunner {
    pub fn new(config: Config, store: Arc<SessionStore>) -> Self {
        Self {
            config,
            store,
            collaborators: None,
        }
    }

    pub fn with_collaborators(config: Config, store: Arc<SessionStore>, collaborators: Collaborators) -> Self {
        Self {
            config,
            store,
            collaborators: Some(collaborators),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 处理一个已处于 `processing` 状态的会话，返回最终状态
    pub async fn run(&self, session_id: &str) -> SessionStatus {
        let (files, input_dir) = match self.store.session_files(session_id).await {
            Ok(v) => v,
            Err(e) => {
                error!("❌ 无法读取会话 {}: {}", session_id, e);
                return SessionStatus::Error;
            }
        };

        logging::log_session_start(session_id, files.len());

        // 设置错误直接让整个会话失败
        let session_settings = match settings::load_for_session(&self.config).await {
            Ok(s) => s,
            Err(e) => {
                error!("❌ 会话 {} 加载设置失败: {}", session_id, e);
                self.store.fail(session_id, e.to_string()).await;
                return SessionStatus::Error;
            }
        };

        let collaborators = match &self.collaborators {
            Some(c) => c.clone(),
            None => Collaborators::for_session(&self.config, &session_settings.secrets),
        };
        let flow = FormFlow::new(&self.config, session_settings, collaborators, self.store.clone());

        let total_files = files.len();
        for (file_index, filename) in files.iter().enumerate() {
            if self.store.is_cancel_requested(session_id).await {
                return self.cancel(session_id).await;
            }

            self.store.set_current_file(session_id, file_index, filename).await;
            info!("📄 [{}/{}] 开始处理: {}", file_index + 1, total_files, filename);

            let outcome = match FormCode::from_filename(filename) {
                Ok(form_code) => {
                    let ctx = FormCtx::new(
                        session_id.to_string(),
                        file_index,
                        total_files,
                        filename.clone(),
                        form_code,
                        input_dir.join(filename),
                    );
                    flow.run(&ctx).await
                }
                Err(e) => Err(AppError::from(e)),
            };

            match outcome {
                Ok(outcome) => {
                    self.store.add_stats(&outcome.stats).await;
                    self.store
                        .record_result(session_id, FileResult::Completed(outcome.summary))
                        .await;
                }
                Err(AppError::Pipeline(PipelineError::Cancelled)) => {
                    return self.cancel(session_id).await;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("❌ 文件 {} 处理失败: {}", filename, message);
                    match self.config.failure_policy {
                        FailurePolicy::ContinueOnError => {
                            self.store
                                .record_result(
                                    session_id,
                                    FileResult::Error {
                                        filename: filename.clone(),
                                        error: message,
                                    },
                                )
                                .await;
                        }
                        FailurePolicy::AbortBatch => {
                            self.store
                                .fail(session_id, format!("{}: {}", filename, message))
                                .await;
                            return SessionStatus::Error;
                        }
                    }
                }
            }

            self.store.finish_file(session_id, file_index).await;
        }

        self.store.complete(session_id).await;
        if let Ok(results) = self.store.get_results(session_id).await {
            logging::log_session_complete(session_id, &results.results);
        }
        SessionStatus::Completed
    }

    async fn cancel(&self, session_id: &str) -> SessionStatus {
        warn!("⏹ 会话 {} 已取消", session_id);
        self.store.mark_cancelled(session_id).await;
        SessionStatus::Cancelled
    }
}
