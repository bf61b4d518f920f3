//! 图片分割 - 业务能力层
//!
//! 只负责"把页面图片切成表单区段"能力，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::debug;

use crate::models::FormCode;
use crate::services::rasterizer::RasterizedPdf;
use crate::utils::SeededRng;

static SECTION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^section_(\d+)(_title)?$").expect("static regex"));

/// 区段类型：第 0 个区段是标题，其余是普通区段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Title,
    Body,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Title => "title",
            SectionKind::Body => "section",
        }
    }
}

/// 一个区段的图片目录
#[derive(Debug, Clone, PartialEq)]
pub struct SectionImage {
    pub index: usize,
    pub kind: SectionKind,
    pub path: PathBuf,
}

/// 图片分割端口
#[async_trait]
pub trait ImageSegmenter: Send + Sync {
    async fn segment(&self, pdf: &RasterizedPdf, form_code: &FormCode) -> Result<Vec<SectionImage>>;
}

/// 模拟分割：按表单代码生成 2–8 个区段目录，每个目录一张占位图片
#[derive(Debug, Default, Clone)]
pub struct SimulatedSegmenter;

impl SimulatedSegmenter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageSegmenter for SimulatedSegmenter {
    async fn segment(&self, pdf: &RasterizedPdf, form_code: &FormCode) -> Result<Vec<SectionImage>> {
        let parent = pdf
            .images_folder
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| pdf.images_folder.clone());
        let sections_dir = parent.join(format!("{}_sections", form_code));
        fs::create_dir_all(&sections_dir)
            .await
            .with_context(|| format!("无法创建区段目录: {}", sections_dir.display()))?;

        // 种子与光栅化错开，避免页数和区段数总是同步变化
        let mut rng = SeededRng::new(form_code.seed().rotate_left(17));
        let num_sections = rng.range_inclusive(2, 8) as usize;

        let title_dir = sections_dir.join("section_0_title");
        fs::create_dir_all(&title_dir).await?;
        fs::write(title_dir.join("title_image.png"), "Placeholder title section image").await?;

        for i in 1..num_sections {
            let section_dir = sections_dir.join(format!("section_{}", i));
            fs::create_dir_all(&section_dir).await?;
            fs::write(
                section_dir.join(format!("section_{}_image.png", i)),
                format!("Placeholder section {} image", i),
            )
            .await?;
        }

        debug!("分割为 {} 个区段 (模拟)", num_sections);
        list_sections(&sections_dir).await
    }
}

/// 列出区段目录，按区段序号排序（`section_10` 排在 `section_2` 之后）
pub async fn list_sections(sections_dir: &Path) -> Result<Vec<SectionImage>> {
    let mut sections = Vec::new();
    let mut entries = fs::read_dir(sections_dir)
        .await
        .with_context(|| format!("无法读取区段目录: {}", sections_dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(caps) = SECTION_DIR.captures(&name) else {
            continue;
        };
        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };
        let kind = if caps.get(2).is_some() {
            SectionKind::Title
        } else {
            SectionKind::Body
        };
        sections.push(SectionImage {
            index,
            kind,
            path: entry.path(),
        });
    }

    sections.sort_by_key(|s| (s.index, s.kind != SectionKind::Title));
    Ok(sections)
}

/// 区段目录中的第一张图片（按文件名排序）
pub async fn first_image(section_dir: &Path) -> Result<Option<PathBuf>> {
    let mut images = Vec::new();
    let mut entries = fs::read_dir(section_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images.into_iter().next())
}
