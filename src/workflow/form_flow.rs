//! 表单处理流程 - 流程层
//!
//! 核心职责：定义"一个 PDF 文件"的完整处理流程
//!
//! 流程顺序（七个固定步骤）：
//! 1. 初始化 → 2. PDF 转图片 → 3. 分割区段 → 4. 提取表单代码
//! 5. 逐个处理区段 → 6. 写入 JSON → 7. 生成 AF 内容包
//!
//! 每个步骤前后都会向会话注册表报告进度，步骤开始前检查取消请求，
//! 步骤本身受超时限制。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, PipelineError};
use crate::models::{FileStats, FileSummary, FormRecord, FormSection, HeaderDetails, Step};
use crate::orchestrator::session_store::SessionStore;
use crate::services::form_writer::write_form_json;
use crate::services::{Collaborators, ExtractedSection};
use crate::settings::SessionSettings;
use crate::workflow::form_ctx::FormCtx;

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub summary: FileSummary,
    pub stats: FileStats,
}

/// 表单处理流程
///
/// - 编排七个步骤
/// - 只依赖业务能力（services），不关心会话如何调度
pub struct FormFlow {
    collaborators: Collaborators,
    settings: SessionSettings,
    store: Arc<SessionStore>,
    outputs_dir: PathBuf,
    images_dir: PathBuf,
    json_dir: PathBuf,
    latency_scale: f64,
    step_timeout: Duration,
}

impl FormFlow {
    pub fn new(
        config: &Config,
        settings: SessionSettings,
        collaborators: Collaborators,
        store: Arc<SessionStore>,
    ) -> Self {
        let latency_scale = if config.simulated_latency_scale.is_finite() {
            config.simulated_latency_scale.max(0.0)
        } else {
            0.0
        };
        Self {
            collaborators,
            settings,
            store,
            outputs_dir: config.outputs_dir.clone(),
            images_dir: config.images_dir(),
            json_dir: config.json_outputs_dir(),
            latency_scale,
            step_timeout: config.step_timeout(),
        }
    }

    pub async fn run(&self, ctx: &FormCtx) -> AppResult<FileOutcome> {
        let code = &ctx.form_code;
        let c = &self.collaborators;

        // 图片、区段、JSON 路径都以表单代码命名，同一代码的文件依次处理
        let _form_guard = self.store.lock_form(code).await;

        // ========== 1. 初始化 ==========
        let mut record = self
            .step(ctx, Step::Initializing, async {
                if !tokio::fs::try_exists(&ctx.input_path).await.unwrap_or(false) {
                    anyhow::bail!("上传文件不存在: {}", ctx.input_path.display());
                }
                tokio::fs::create_dir_all(&self.images_dir).await?;
                tokio::fs::create_dir_all(&self.json_dir).await?;
                Ok::<_, anyhow::Error>(FormRecord::new(self.settings.secrets.t_number()))
            })
            .await?;

        // ========== 2. PDF 转图片 ==========
        let rasterized = self
            .step(
                ctx,
                Step::ConvertingImages,
                c.rasterizer.rasterize(&ctx.input_path, &self.images_dir, code),
            )
            .await?;
        info!("{} 📄 共 {} 页", ctx, rasterized.page_count);

        // ========== 3. 分割区段 ==========
        let sections = self
            .step(ctx, Step::SegmentingSections, c.segmenter.segment(&rasterized, code))
            .await?;
        info!("{} 🧩 共 {} 个区段", ctx, sections.len());

        // ========== 4. 提取表单代码 ==========
        record.form_code = self
            .step(ctx, Step::ExtractingFormCode, async { Ok::<_, anyhow::Error>(code.to_string()) })
            .await?;

        // ========== 5. 逐个处理区段 ==========
        let (extracted, tokens, cost) = self
            .step(ctx, Step::ProcessingSections, async {
                let mut extracted = Vec::new();
                let mut tokens = 0u64;
                let mut cost = 0.0f64;
                for section in &sections {
                    let extraction = c.extractor.extract(code, section).await?;
                    tokens += extraction.tokens;
                    cost += extraction.cost;
                    match extraction.content {
                        Some(content) => extracted.push(content),
                        None => warn!("{} ⚠️ 区段 {} 无法处理，已跳过", ctx, section.index),
                    }
                }
                Ok::<_, anyhow::Error>((extracted, tokens, cost))
            })
            .await?;
        apply_sections(&mut record, extracted);
        info!("{} 🧾 共提取 {} 个字段", ctx, record.field_count());

        // ========== 6. 写入 JSON ==========
        let json_path = self
            .step(ctx, Step::WritingJson, write_form_json(&record, code, &self.json_dir))
            .await?;

        // ========== 7. 生成 AF 内容包 ==========
        let artifact = self
            .step(ctx, Step::GeneratingPackage, async {
                let content_xml = c.af_generator.generate(&json_path).await?;
                c.packager
                    .package(
                        code,
                        self.settings.packager_mode,
                        &record.last_modified_date,
                        record.last_modified_by.as_deref(),
                        &content_xml,
                    )
                    .await
            })
            .await?;

        let json_file = json_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let summary = FileSummary {
            filename: ctx.filename.clone(),
            form_code: code.to_string(),
            page_count: rasterized.page_count,
            num_sections: sections.len() as u64,
            total_tokens: tokens,
            total_cost: cost,
            package_name: artifact.package_name,
            json_file,
            package_file: relative_download_path(&self.outputs_dir, &artifact.archive_path),
        };
        let stats = FileStats {
            tokens,
            cost,
            pages: rasterized.page_count,
            sections: sections.len() as u64,
        };

        info!(
            "{} ✅ 完成: {} 页, {} 区段, {} tokens, ${:.4}",
            ctx, stats.pages, stats.sections, stats.tokens, stats.cost
        );
        Ok(FileOutcome { summary, stats })
    }

    /// 执行一个步骤：取消检查 → 记录进入 → (模拟延迟 + 工作) 限时执行 → 记录完成
    async fn step<T, F>(&self, ctx: &FormCtx, step: Step, work: F) -> AppResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if self.store.is_cancel_requested(&ctx.session_id).await {
            return Err(PipelineError::Cancelled.into());
        }

        self.store.enter_step(&ctx.session_id, ctx.file_index, step).await;
        info!("{} ▶ {}", ctx, step);

        let latency = step.base_latency().mul_f64(self.latency_scale);
        let timed = async {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            work.await
        };

        let value = match tokio::time::timeout(self.step_timeout, timed).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(AppError::step_failed(step.label(), format!("{:#}", e))),
            Err(_) => {
                return Err(PipelineError::StepTimeout {
                    step: step.label().to_string(),
                    timeout_secs: self.step_timeout.as_secs(),
                }
                .into())
            }
        };

        self.store.finish_step(&ctx.session_id, ctx.file_index, step).await;
        Ok(value)
    }
}

/// 把提取结果按顺序写入表单记录
///
/// 标题区段设置表单标题；若带有表头信息，则追加一个表头区段。
pub fn apply_sections(record: &mut FormRecord, extracted: Vec<ExtractedSection>) {
    for section in extracted {
        match section {
            ExtractedSection::Title { form_title, headers } => {
                record.form_title = form_title;
                if !headers.is_empty() {
                    record.sections.push(FormSection::Headers(HeaderDetails::new(headers)));
                }
            }
            ExtractedSection::Body(content) => record.sections.push(FormSection::Content(content)),
        }
    }
}

/// 产物相对输出目录的下载路径（统一使用 `/`）
fn relative_download_path(outputs_dir: &Path, archive_path: &Path) -> String {
    match archive_path.strip_prefix(outputs_dir) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FormCode, ProcessingMode, SectionContent};
    use crate::settings::{PackagerMode, Secrets};

    fn flow_for(root: &Path, store: Arc<SessionStore>) -> FormFlow {
        let mut config = Config::default().with_root(root);
        config.simulated_latency_scale = 0.0;
        let settings = SessionSettings {
            packager_mode: PackagerMode::Dev,
            secrets: Secrets {
                t_number: "T42".to_string(),
                ..Default::default()
            },
        };
        let collaborators = Collaborators::simulated(&config);
        FormFlow::new(&config, settings, collaborators, store)
    }

    async fn ctx_for(root: &Path, store: &SessionStore, filename: &str) -> FormCtx {
        let input_dir = root.join("uploads");
        std::fs::create_dir_all(&input_dir).unwrap();
        std::fs::write(input_dir.join(filename), b"%PDF-1.4 /Type /Page /Type /Page").unwrap();
        let id = store
            .create_session(vec![filename.to_string()], input_dir.clone(), ProcessingMode::Single)
            .await
            .unwrap();
        store.begin_processing(&id).await.unwrap();
        FormCtx::new(
            id,
            0,
            1,
            filename.to_string(),
            FormCode::from_filename(filename).unwrap(),
            input_dir.join(filename),
        )
    }

    #[tokio::test]
    async fn test_run_produces_summary_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new());
        let ctx = ctx_for(dir.path(), &store, "ABCD.pdf").await;
        let flow = flow_for(dir.path(), store.clone());

        let outcome = flow.run(&ctx).await.unwrap();

        assert_eq!(outcome.summary.form_code, "ABCD");
        assert_eq!(outcome.summary.page_count, 2);
        assert_eq!(outcome.summary.package_name, "ABCD_DEV");
        assert_eq!(outcome.summary.package_file, "generated_AF/ABCD_DEV.zip");
        assert_eq!(outcome.summary.json_file, "ABCD_input_for_af.json");
        assert_eq!(outcome.stats.sections, outcome.summary.num_sections);
        assert!(dir.path().join("outputs/generated_AF/ABCD_DEV.zip").exists());

        let json = std::fs::read_to_string(dir.path().join("outputs/json_outputs/ABCD_input_for_af.json")).unwrap();
        let record: FormRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.form_code, "ABCD");
        assert_eq!(record.last_modified_by.as_deref(), Some("T42"));
        assert_eq!(record.sections.len() as u64, outcome.summary.num_sections - 1);

        let snapshot = store.get_progress(&ctx.session_id).await.unwrap();
        assert_eq!(snapshot.current_step, Step::COUNT - 1);
        assert!((snapshot.progress - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new());
        let ctx = ctx_for(dir.path(), &store, "WXYZ.pdf").await;
        store.request_cancel(&ctx.session_id).await.unwrap();

        let err = flow_for(dir.path(), store).run(&ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Pipeline(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_input_fails_first_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new());
        let mut ctx = ctx_for(dir.path(), &store, "ABCD.pdf").await;
        ctx.input_path = dir.path().join("nope.pdf");

        let err = flow_for(dir.path(), store).run(&ctx).await.unwrap_err();
        assert!(err.to_string().contains(Step::Initializing.label()));
    }

    #[test]
    fn test_apply_sections_title_and_headers() {
        let mut record = FormRecord::new(None);
        apply_sections(
            &mut record,
            vec![
                ExtractedSection::Title {
                    form_title: "Vehicle Registration".to_string(),
                    headers: vec![serde_json::json!({"agency": "DMV"})],
                },
                ExtractedSection::Body(SectionContent {
                    section_title: "Owner".to_string(),
                    fields: Vec::new(),
                    extra: Default::default(),
                }),
            ],
        );
        assert_eq!(record.form_title, "Vehicle Registration");
        assert_eq!(record.sections.len(), 2);
        assert!(matches!(record.sections[0], FormSection::Headers(_)));
    }
}
