//! 会话注册表 - 编排层
//!
//! ## 职责
//!
//! - 持有所有会话记录（只增不删）和全局统计
//! - 会话状态的原子转换（`pending → processing` 等）
//! - 进度记录，保证进度单调不减
//!
//! 由 HTTP 层和工作池共享（`Arc<SessionStore>`），读写分别走 `RwLock` 和 `Mutex`。

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::SessionError;
use crate::models::step::{entered_fraction, finished_fraction, overall_progress};
use crate::models::{
    FileResult, FileStats, FormCode, GlobalStats, ProcessingMode, SessionRecord, SessionSnapshot,
    SessionStatus, Step,
};

/// 结果接口的返回内容
#[derive(Debug, Clone, Serialize)]
pub struct SessionResults {
    pub session_id: String,
    pub results: Vec<FileResult>,
    pub global_stats: GlobalStats,
}

/// 会话注册表
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    stats: Mutex<GlobalStats>,
    /// 同一表单代码共用输出路径，按表单代码串行
    form_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取表单代码的独占锁，持有期间其他会话不会处理同一表单代码
    pub async fn lock_form(&self, form_code: &FormCode) -> OwnedMutexGuard<()> {
        let lock = self
            .form_locks
            .lock()
            .await
            .entry(form_code.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// 创建会话，返回会话 ID
    pub async fn create_session(
        &self,
        files: Vec<String>,
        input_dir: PathBuf,
        mode: ProcessingMode,
    ) -> Result<String, SessionError> {
        if files.is_empty() {
            return Err(SessionError::NoFiles);
        }
        let session_id = Uuid::new_v4().to_string();
        self.insert_session(session_id.clone(), files, input_dir, mode)
            .await?;
        Ok(session_id)
    }

    /// 以指定 ID 创建会话（上传目录需要先确定会话 ID）
    pub async fn insert_session(
        &self,
        session_id: String,
        files: Vec<String>,
        input_dir: PathBuf,
        mode: ProcessingMode,
    ) -> Result<(), SessionError> {
        if files.is_empty() {
            return Err(SessionError::NoFiles);
        }
        let record = SessionRecord::new(session_id.clone(), files, input_dir, mode);
        self.sessions.write().await.insert(session_id.clone(), record);
        debug!("已创建会话 {}", session_id);
        Ok(())
    }

    /// `pending → processing`，返回会话的文件列表和输入目录
    pub async fn begin_processing(&self, session_id: &str) -> Result<(Vec<String>, PathBuf), SessionError> {
        let mut sessions = self.sessions.write().await;
        let record = get_mut(&mut sessions, session_id)?;
        if record.status != SessionStatus::Pending {
            return Err(SessionError::NotPending {
                session_id: session_id.to_string(),
                status: record.status.to_string(),
            });
        }
        record.status = SessionStatus::Processing;
        Ok((record.files.clone(), record.input_dir.clone()))
    }

    /// 入队失败时退回 `pending`
    ///
    /// 期间收到过取消请求的会话直接标记为已取消。
    pub async fn revert_to_pending(&self, session_id: &str) {
        if let Some(record) = self.sessions.write().await.get_mut(session_id) {
            if record.status == SessionStatus::Processing {
                if record.cancel_requested {
                    record.status = SessionStatus::Cancelled;
                    record.error_message = Some("处理已被取消".to_string());
                } else {
                    record.status = SessionStatus::Pending;
                }
            }
        }
    }

    /// 会话信息（文件列表、输入目录）
    pub async fn session_files(&self, session_id: &str) -> Result<(Vec<String>, PathBuf), SessionError> {
        let sessions = self.sessions.read().await;
        let record = get(&sessions, session_id)?;
        Ok((record.files.clone(), record.input_dir.clone()))
    }

    pub async fn get_progress(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(get(&sessions, session_id)?.snapshot())
    }

    pub async fn status(&self, session_id: &str) -> Result<SessionStatus, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(get(&sessions, session_id)?.status)
    }

    /// 最终结果，仅在会话完成后可用
    pub async fn get_results(&self, session_id: &str) -> Result<SessionResults, SessionError> {
        let results = {
            let sessions = self.sessions.read().await;
            let record = get(&sessions, session_id)?;
            if record.status != SessionStatus::Completed {
                return Err(SessionError::NotCompleted {
                    session_id: session_id.to_string(),
                    status: record.status.to_string(),
                });
            }
            record.results.clone()
        };
        Ok(SessionResults {
            session_id: session_id.to_string(),
            results,
            global_stats: self.global_stats().await,
        })
    }

    /// 开始处理第 `file_index` 个文件，步骤归零
    pub async fn set_current_file(&self, session_id: &str, file_index: usize, filename: &str) {
        self.update(session_id, |record| {
            record.current_file_index = file_index;
            record.current_file = Some(filename.to_string());
            record.current_step = 0;
        })
        .await;
    }

    pub async fn enter_step(&self, session_id: &str, file_index: usize, step: Step) {
        self.update(session_id, |record| {
            record.current_step = record.current_step.max(step.index());
            let total = record.files.len();
            bump_progress(record, overall_progress(file_index, entered_fraction(step), total));
        })
        .await;
    }

    pub async fn finish_step(&self, session_id: &str, file_index: usize, step: Step) {
        self.update(session_id, |record| {
            let total = record.files.len();
            bump_progress(record, overall_progress(file_index, finished_fraction(step), total));
        })
        .await;
    }

    /// 文件处理结束（成功或失败），进度推进到该文件末尾
    pub async fn finish_file(&self, session_id: &str, file_index: usize) {
        self.update(session_id, |record| {
            let total = record.files.len();
            bump_progress(record, overall_progress(file_index + 1, 0.0, total));
        })
        .await;
    }

    pub async fn record_result(&self, session_id: &str, result: FileResult) {
        self.update(session_id, |record| record.results.push(result)).await;
    }

    pub async fn complete(&self, session_id: &str) {
        self.update(session_id, |record| {
            record.status = SessionStatus::Completed;
            record.progress = 100.0;
        })
        .await;
    }

    pub async fn fail(&self, session_id: &str, message: impl Into<String>) {
        let message = message.into();
        self.update(session_id, |record| {
            record.status = SessionStatus::Error;
            record.error_message = Some(message);
        })
        .await;
    }

    pub async fn mark_cancelled(&self, session_id: &str) {
        self.update(session_id, |record| {
            record.status = SessionStatus::Cancelled;
            record.error_message = Some("处理已被取消".to_string());
        })
        .await;
    }

    /// 请求取消
    ///
    /// 尚未开始的会话直接标记为已取消；处理中的会话由工作任务在下一个检查点结束。
    pub async fn request_cancel(&self, session_id: &str) -> Result<SessionStatus, SessionError> {
        let mut sessions = self.sessions.write().await;
        let record = get_mut(&mut sessions, session_id)?;
        match record.status {
            status if status.is_finished() => Err(SessionError::AlreadyFinished {
                session_id: session_id.to_string(),
                status: status.to_string(),
            }),
            SessionStatus::Pending => {
                record.cancel_requested = true;
                record.status = SessionStatus::Cancelled;
                record.error_message = Some("处理已被取消".to_string());
                Ok(record.status)
            }
            _ => {
                record.cancel_requested = true;
                Ok(record.status)
            }
        }
    }

    pub async fn is_cancel_requested(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|r| r.cancel_requested)
            .unwrap_or(false)
    }

    pub async fn add_stats(&self, file_stats: &FileStats) {
        self.stats.lock().await.add(file_stats);
    }

    pub async fn global_stats(&self) -> GlobalStats {
        *self.stats.lock().await
    }

    async fn update(&self, session_id: &str, f: impl FnOnce(&mut SessionRecord)) {
        if let Some(record) = self.sessions.write().await.get_mut(session_id) {
            f(record);
        }
    }
}

fn get<'a>(
    sessions: &'a HashMap<String, SessionRecord>,
    session_id: &str,
) -> Result<&'a SessionRecord, SessionError> {
    sessions.get(session_id).ok_or_else(|| SessionError::NotFound {
        session_id: session_id.to_string(),
    })
}

fn get_mut<'a>(
    sessions: &'a mut HashMap<String, SessionRecord>,
    session_id: &str,
) -> Result<&'a mut SessionRecord, SessionError> {
    sessions.get_mut(session_id).ok_or_else(|| SessionError::NotFound {
        session_id: session_id.to_string(),
    })
}

fn bump_progress(record: &mut SessionRecord, value: f64) {
    record.progress = record.progress.max(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileSummary;

    fn summary(name: &str) -> FileSummary {
        FileSummary {
            filename: name.to_string(),
            form_code: "ABCD".to_string(),
            page_count: 3,
            num_sections: 2,
            total_tokens: 300,
            total_cost: 0.003,
            package_name: "ABCD_SANDBOX".to_string(),
            json_file: "ABCD_input_for_af.json".to_string(),
            package_file: "generated_AF/ABCD_SANDBOX.zip".to_string(),
        }
    }

    async fn new_session(store: &SessionStore, files: &[&str]) -> String {
        store
            .create_session(
                files.iter().map(|f| f.to_string()).collect(),
                PathBuf::from("uploads"),
                ProcessingMode::Batch,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_empty_file_list() {
        let store = SessionStore::new();
        let result = store
            .create_session(Vec::new(), PathBuf::from("uploads"), ProcessingMode::Single)
            .await;
        assert!(matches!(result, Err(SessionError::NoFiles)));
    }

    #[tokio::test]
    async fn test_begin_processing_only_once() {
        let store = SessionStore::new();
        let id = new_session(&store, &["ABCD.pdf"]).await;

        let (files, _) = store.begin_processing(&id).await.unwrap();
        assert_eq!(files, vec!["ABCD.pdf".to_string()]);
        assert!(matches!(
            store.begin_processing(&id).await,
            Err(SessionError::NotPending { .. })
        ));
        assert!(matches!(
            store.begin_processing("missing").await,
            Err(SessionError::NotFound { .. })
        ));

        store.revert_to_pending(&id).await;
        assert_eq!(store.status(&id).await.unwrap(), SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let store = SessionStore::new();
        let id = new_session(&store, &["ABCD.pdf", "EFGH.pdf"]).await;
        store.begin_processing(&id).await.unwrap();

        let mut last = 0.0;
        for file_index in 0..2 {
            store.set_current_file(&id, file_index, "x.pdf").await;
            for step in Step::ALL {
                store.enter_step(&id, file_index, step).await;
                let p = store.get_progress(&id).await.unwrap().progress;
                assert!(p >= last);
                last = p;
                store.finish_step(&id, file_index, step).await;
                let p = store.get_progress(&id).await.unwrap().progress;
                assert!(p >= last);
                last = p;
            }
            store.finish_file(&id, file_index).await;
        }
        assert!((last - 100.0).abs() < 1e-9);

        // 较早的步骤不会让进度回退
        store.enter_step(&id, 0, Step::Initializing).await;
        assert!((store.get_progress(&id).await.unwrap().progress - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_results_only_after_completion() {
        let store = SessionStore::new();
        let id = new_session(&store, &["ABCD.pdf"]).await;

        assert!(matches!(
            store.get_results(&id).await,
            Err(SessionError::NotCompleted { .. })
        ));

        store.begin_processing(&id).await.unwrap();
        store.record_result(&id, FileResult::Completed(summary("ABCD.pdf"))).await;
        assert!(store.get_results(&id).await.is_err());

        store.complete(&id).await;
        let results = store.get_results(&id).await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.session_id, id);
    }

    #[tokio::test]
    async fn test_cancel_pending_and_finished() {
        let store = SessionStore::new();
        let id = new_session(&store, &["ABCD.pdf"]).await;

        assert_eq!(store.request_cancel(&id).await.unwrap(), SessionStatus::Cancelled);
        assert!(store.is_cancel_requested(&id).await);
        assert!(matches!(
            store.request_cancel(&id).await,
            Err(SessionError::AlreadyFinished { .. })
        ));
        assert!(matches!(
            store.begin_processing(&id).await,
            Err(SessionError::NotPending { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_processing_sets_flag() {
        let store = SessionStore::new();
        let id = new_session(&store, &["ABCD.pdf"]).await;
        store.begin_processing(&id).await.unwrap();

        assert_eq!(store.request_cancel(&id).await.unwrap(), SessionStatus::Processing);
        assert!(store.is_cancel_requested(&id).await);

        store.mark_cancelled(&id).await;
        let snapshot = store.get_progress(&id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_revert_after_cancel_request_ends_cancelled() {
        let store = SessionStore::new();
        let id = new_session(&store, &["ABCD.pdf"]).await;
        store.begin_processing(&id).await.unwrap();
        store.request_cancel(&id).await.unwrap();

        store.revert_to_pending(&id).await;

        assert_eq!(store.status(&id).await.unwrap(), SessionStatus::Cancelled);
        assert!(matches!(
            store.begin_processing(&id).await,
            Err(SessionError::NotPending { .. })
        ));
    }

    #[tokio::test]
    async fn test_form_lock_serializes_same_code() {
        let store = SessionStore::new();
        let abcd = FormCode::from_filename("ABCD.pdf").unwrap();
        let wxyz = FormCode::from_filename("WXYZ.pdf").unwrap();

        let guard = store.lock_form(&abcd).await;
        // 不同代码互不阻塞
        let _other = store.lock_form(&wxyz).await;
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_form(&abcd),
        )
        .await;
        assert!(waiting.is_err());

        drop(guard);
        let _again = store.lock_form(&abcd).await;
    }

    #[tokio::test]
    async fn test_global_stats_accumulate() {
        let store = SessionStore::new();
        store
            .add_stats(&FileStats { tokens: 100, cost: 0.001, pages: 3, sections: 2 })
            .await;
        store
            .add_stats(&FileStats { tokens: 50, cost: 0.0005, pages: 1, sections: 4 })
            .await;

        let stats = store.global_stats().await;
        assert_eq!(stats.total_tokens_all_forms, 150);
        assert_eq!(stats.total_pages_all_forms, 4);
        assert_eq!(stats.total_sections_all_forms, 6);
        assert!((stats.total_cost_all_forms - 0.0015).abs() < 1e-12);
    }
}
