/// 日志工具模块
///
/// 提供日志初始化与格式化输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{FileResult, GlobalStats};

/// 初始化 tracing（默认 info，可用 RUST_LOG 覆盖）
///
/// 重复调用是安全的，后续调用会被忽略。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录服务启动信息
pub fn log_server_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 PDF → AF 转换服务启动");
    info!("🌐 监听地址: {}:{}", config.host, config.port);
    info!("📊 最大并发会话数: {}", config.max_concurrent_sessions);
    info!("📥 队列容量: {}", config.queue_capacity);
    info!("📁 输出目录: {}", config.outputs_dir.display());
    info!("{}", "=".repeat(60));
}

/// 记录会话开始信息
pub fn log_session_start(session_id: &str, total_files: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理会话 {}", session_id);
    info!("📄 文件总数: {}", total_files);
    info!("{}", "=".repeat(60));
}

/// 记录会话完成信息
pub fn log_session_complete(session_id: &str, results: &[FileResult]) {
    let success = results.iter().filter(|r| r.is_completed()).count();
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 会话 {} 完成: 成功 {}/{}",
        session_id,
        success,
        results.len()
    );
    for failed in results.iter().filter(|r| !r.is_completed()) {
        warn!("  ❌ {}", failed.filename());
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(results: &[FileResult], stats: &GlobalStats) {
    let success = results.iter().filter(|r| r.is_completed()).count();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, results.len());
    info!("❌ 失败: {}", results.len() - success);
    info!("📄 页数: {}", stats.total_pages_all_forms);
    info!("🧩 区段数: {}", stats.total_sections_all_forms);
    info!("🔢 每页平均 token: {:.2}", stats.average_tokens_per_page());
    info!("💰 每页平均费用: {:.6}", stats.average_cost_per_page());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("表单标题很长", 2), "表单...");
    }
}
