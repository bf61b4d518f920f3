//! 命令行批量转换
//!
//! 不经过 HTTP 和工作池，直接用 `SessionRunner` 处理一个文件或一个目录，
//! 结束后把每个表单的统计追加到 `form_summary.csv`。

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::{Config, FailurePolicy};
use crate::models::{FileResult, FormCode, ProcessingMode, SessionStatus};
use crate::orchestrator::{SessionRunner, SessionStore};
use crate::utils::logging;

const CSV_HEADER: &str =
    "date,form_code,no. of pages,no. of sections,total tokens for form,total cost for form";

/// 要转换的输入
#[derive(Debug, Clone)]
pub enum ConvertInput {
    File(PathBuf),
    Dir(PathBuf),
}

/// 转换结束后的汇总
#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub status: SessionStatus,
    pub results: Vec<FileResult>,
    pub error_message: Option<String>,
}

/// 执行转换
pub async fn convert(mut config: Config, input: ConvertInput, continue_on_error: bool) -> Result<ConvertReport> {
    config.failure_policy = if continue_on_error {
        FailurePolicy::ContinueOnError
    } else {
        FailurePolicy::AbortBatch
    };
    config.ensure_dirs().await.context("无法创建输出目录")?;

    let (input_dir, files, mode) = collect_inputs(&input).await?;
    if files.is_empty() {
        bail!("没有找到可转换的 PDF 文件: {}", input_dir.display());
    }
    info!("✓ 找到 {} 个待转换的 PDF", files.len());

    let store = Arc::new(SessionStore::new());
    let session_id = store.create_session(files, input_dir, mode).await?;
    store.begin_processing(&session_id).await?;

    let runner = SessionRunner::new(config.clone(), store.clone());
    let status = runner.run(&session_id).await;

    let snapshot = store.get_progress(&session_id).await?;
    let stats = store.global_stats().await;

    append_summary_csv(&config.summary_csv_path(), &snapshot.results).await?;
    logging::print_final_stats(&snapshot.results, &stats);
    info!("📝 汇总已追加到: {}", config.summary_csv_path().display());

    Ok(ConvertReport {
        status,
        results: snapshot.results,
        error_message: snapshot.error_message,
    })
}

/// 确定输入目录和文件名列表
async fn collect_inputs(input: &ConvertInput) -> Result<(PathBuf, Vec<String>, ProcessingMode)> {
    match input {
        ConvertInput::File(path) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("无效的文件路径: {}", path.display()))?;
            FormCode::from_filename(&filename)?;
            if !path.is_file() {
                bail!("文件不存在: {}", path.display());
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((dir, vec![filename], ProcessingMode::Single))
        }
        ConvertInput::Dir(dir) => {
            let mut files = Vec::new();
            let mut entries = tokio::fs::read_dir(dir)
                .await
                .with_context(|| format!("无法读取目录: {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                match FormCode::from_filename(&name) {
                    Ok(_) => files.push(name),
                    Err(e) if crate::models::form::has_pdf_extension(&name) => {
                        warn!("⚠️ 跳过 {}: {}", name, e)
                    }
                    Err(_) => {}
                }
            }
            files.sort();
            Ok((dir.clone(), files, ProcessingMode::Batch))
        }
    }
}

/// 追加汇总行，文件不存在或为空时先写表头
pub async fn append_summary_csv(path: &Path, results: &[FileResult]) -> Result<()> {
    let rows = summary_rows(results, &chrono::Local::now().format("%Y-%m-%d").to_string());
    if rows.is_empty() {
        return Ok(());
    }

    let needs_header = tokio::fs::metadata(path)
        .await
        .map(|m| m.len() == 0)
        .unwrap_or(true);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("无法打开汇总文件: {}", path.display()))?;

    let mut content = String::new();
    if needs_header {
        content.push_str(CSV_HEADER);
        content.push('\n');
    }
    for row in rows {
        content.push_str(&row);
        content.push('\n');
    }
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

fn summary_rows(results: &[FileResult], date: &str) -> Vec<String> {
    results
        .iter()
        .filter_map(|r| match r {
            FileResult::Completed(s) => Some(format!(
                "{},{},{},{},{},{}",
                date, s.form_code, s.page_count, s.num_sections, s.total_tokens, s.total_cost
            )),
            FileResult::Error { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileSummary;

    fn completed(code: &str) -> FileResult {
        FileResult::Completed(FileSummary {
            filename: format!("{}.pdf", code),
            form_code: code.to_string(),
            page_count: 4,
            num_sections: 3,
            total_tokens: 1200,
            total_cost: 0.012,
            package_name: format!("{}_SANDBOX", code),
            json_file: format!("{}_input_for_af.json", code),
            package_file: format!("generated_AF/{}_SANDBOX.zip", code),
        })
    }

    #[tokio::test]
    async fn test_csv_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form_summary.csv");

        append_summary_csv(&path, &[completed("ABCD")]).await.unwrap();
        append_summary_csv(
            &path,
            &[
                completed("WXYZ"),
                FileResult::Error {
                    filename: "EFGH.pdf".to_string(),
                    error: "boom".to_string(),
                },
            ],
        )
        .await
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].ends_with(",ABCD,4,3,1200,0.012"));
        assert!(lines[2].contains(",WXYZ,"));
        assert_eq!(content.matches("form_code").count(), 1);
    }

    #[tokio::test]
    async fn test_collect_inputs_from_dir_filters_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ABCD.pdf", "1bcd.pdf", "notes.txt", "WXYZ_x.PDF"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }

        let (_, files, mode) = collect_inputs(&ConvertInput::Dir(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(files, vec!["ABCD.pdf".to_string(), "WXYZ_x.PDF".to_string()]);
        assert_eq!(mode, ProcessingMode::Batch);
    }

    #[tokio::test]
    async fn test_collect_inputs_rejects_bad_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("12ab.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        assert!(collect_inputs(&ConvertInput::File(path)).await.is_err());
    }
}
