//! PDF 转图片 - 业务能力层
//!
//! 只负责"把一份 PDF 变成逐页图片"能力，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::debug;

use crate::models::FormCode;
use crate::utils::SeededRng;

/// 页面对象，排除 `/Type /Pages` 节点
static PAGE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Type\s*/Page([^s]|$)").expect("static regex"));

/// 转换结果
#[derive(Debug, Clone, PartialEq)]
pub struct RasterizedPdf {
    /// 存放逐页图片的目录
    pub images_folder: PathBuf,
    pub page_count: u64,
}

/// PDF 光栅化端口
#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    async fn rasterize(
        &self,
        pdf_path: &Path,
        images_dir: &Path,
        form_code: &FormCode,
    ) -> Result<RasterizedPdf>;
}

/// 模拟光栅化
///
/// 统计 PDF 中的页面对象数量（无法识别时按表单代码生成 3–12 页），
/// 并为每页写入一个占位图片文件。
#[derive(Debug, Default, Clone)]
pub struct SimulatedRasterizer;

impl SimulatedRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfRasterizer for SimulatedRasterizer {
    async fn rasterize(
        &self,
        pdf_path: &Path,
        images_dir: &Path,
        form_code: &FormCode,
    ) -> Result<RasterizedPdf> {
        let bytes = fs::read(pdf_path)
            .await
            .with_context(|| format!("无法读取PDF文件: {}", pdf_path.display()))?;

        let page_count = match count_pages(&bytes) {
            0 => SeededRng::new(form_code.seed()).range_inclusive(3, 12),
            n => n,
        };

        let images_folder = images_dir.join(format!("{}_images", form_code));
        fs::create_dir_all(&images_folder)
            .await
            .with_context(|| format!("无法创建图片目录: {}", images_folder.display()))?;

        for page in 1..=page_count {
            let image_path = images_folder.join(format!("page_{}.png", page));
            fs::write(&image_path, format!("Placeholder image for page {}", page)).await?;
        }

        debug!("{} 转换为 {} 张图片 (模拟)", pdf_path.display(), page_count);

        Ok(RasterizedPdf {
            images_folder,
            page_count,
        })
    }
}

/// 统计 PDF 字节流中的页面对象
pub fn count_pages(bytes: &[u8]) -> u64 {
    PAGE_OBJECT.find_iter(bytes).count() as u64
}
