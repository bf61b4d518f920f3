//! # PDF → AF Converter
//!
//! 把扫描的 PDF 表单转换为结构化 JSON，并打包成可部署的 Adaptive Form 内容包
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力都是一个 trait（端口）
//! - `PdfRasterizer` - PDF 转图片
//! - `ImageSegmenter` - 图片分割为区段
//! - `SectionExtractor` - 区段内容提取（模拟 / LLM）
//! - `AfGenerator` - 表单 JSON 生成 AF `.content.xml`
//! - `Packager` - 打包为内容包 zip
//!
//! ### ② 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的七步处理流程
//! - `FormCtx` - 上下文封装（会话 + 文件索引 + 表单代码）
//! - `FormFlow` - 流程编排（进度报告、超时、取消）
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/session_store` - 会话注册表与全局统计
//! - `orchestrator/session_runner` - 单个会话处理器，应用失败策略
//! - `orchestrator/batch_processor` - 有界队列 + 并发受限的工作池
//!
//! ### ④ 接入层
//! - `api/` - HTTP 接口（axum）
//! - `cli` - 命令行批量转换
//!
//! ## 模块结构

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod settings;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, FailurePolicy};
pub use error::{AppError, AppResult};
pub use models::{FileResult, FormCode, SessionStatus};
pub use orchestrator::{BatchProcessor, SessionRunner, SessionStore};
pub use workflow::{FormCtx, FormFlow};
