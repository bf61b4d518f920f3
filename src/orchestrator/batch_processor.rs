//! 会话工作池 - 编排层
//!
//! ## 职责
//!
//! - 接收"开始处理"请求，放入有界队列
//! - 调度任务从队列取出会话 ID，在 Semaphore 许可下 `tokio::spawn` 执行
//! - 队列满时拒绝请求，会话退回 `pending`
//!
//! ## 设计特点
//!
//! - **并发受限**：同时处理的会话数不超过 `max_concurrent_sessions`
//! - **队列有界**：等待中的会话数不超过 `queue_capacity`
//! - **向下委托**：委托 `SessionRunner` 处理单个会话

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::SessionError;
use crate::orchestrator::session_runner::SessionRunner;

/// 会话工作池
#[derive(Clone)]
pub struct BatchProcessor {
    sender: mpsc::Sender<String>,
    runner: SessionRunner,
    capacity: usize,
}

impl BatchProcessor {
    /// 创建工作池并启动调度任务
    ///
    /// 必须在 tokio 运行时中调用。
    pub fn start(runner: SessionRunner) -> (Self, JoinHandle<()>) {
        let config = runner.config();
        let capacity = config.queue_capacity.max(1);
        let max_concurrent = config.max_concurrent_sessions.max(1);

        let (sender, receiver) = mpsc::channel(capacity);
        let dispatcher = tokio::spawn(dispatch(receiver, runner.clone(), max_concurrent));

        info!(
            "✓ 工作池已启动 (并发 {}, 队列容量 {})",
            max_concurrent, capacity
        );
        (
            Self {
                sender,
                runner,
                capacity,
            },
            dispatcher,
        )
    }

    /// 提交会话：`pending → processing` 后入队，立即返回
    pub async fn submit(&self, session_id: &str) -> Result<(), SessionError> {
        let store = self.runner.store();
        store.begin_processing(session_id).await?;

        match self.sender.try_send(session_id.to_string()) {
            Ok(()) => {
                info!("📥 会话 {} 已入队", session_id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!("⚠️ 队列已满，拒绝会话 {}", session_id);
                store.revert_to_pending(session_id).await;
                Err(SessionError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => {
                store.revert_to_pending(session_id).await;
                Err(SessionError::WorkerPoolClosed)
            }
        }
    }
}

/// 调度循环：每取出一个会话，先拿到许可再派发
async fn dispatch(mut receiver: mpsc::Receiver<String>, runner: SessionRunner, max_concurrent: usize) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));

    while let Some(session_id) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("工作池信号量已关闭: {}", e);
                break;
            }
        };

        let runner = runner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let status = runner.run(&session_id).await;
            info!("会话 {} 结束，状态: {}", session_id, status);
        });
    }

    info!("工作池调度任务退出");
}
