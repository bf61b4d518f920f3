//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责会话调度和状态管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session_store` - 会话注册表
//! - 持有所有会话和全局统计
//! - 状态转换、进度记录、取消标记
//!
//! ### `batch_processor` - 会话工作池
//! - 有界队列 + Semaphore 控制并发
//! - 队列满时拒绝并退回 `pending`
//!
//! ### `session_runner` - 单个会话处理器
//! - 加载设置，按顺序处理会话中的文件
//! - 应用失败策略，设置最终状态
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (调度会话)
//!     ↓
//! session_runner (处理 Vec<文件>)
//!     ↓
//! workflow::FormFlow (处理单个文件的七个步骤)
//!     ↓
//! services (能力层：rasterizer / segmenter / extractor / af_generator / packager)
//! ```

pub mod batch_processor;
pub mod session_runner;
pub mod session_store;

// 重新导出主要类型
pub use batch_processor::BatchProcessor;
pub use session_runner::SessionRunner;
pub use session_store::{SessionResults, SessionStore};
