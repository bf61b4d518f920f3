pub mod af_generator;
pub mod extractor;
pub mod form_writer;
pub mod llm_extractor;
pub mod packager;
pub mod rasterizer;
pub mod segmenter;

pub use af_generator::{AfGenerator, TemplateAfGenerator};
pub use extractor::{ExtractedSection, Extraction, SectionExtractor, SimulatedExtractor};
pub use llm_extractor::LlmExtractor;
pub use packager::{ContentPackager, PackageArtifact, Packager};
pub use rasterizer::{PdfRasterizer, RasterizedPdf, SimulatedRasterizer};
pub use segmenter::{ImageSegmenter, SectionImage, SectionKind, SimulatedSegmenter};

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ExtractorBackend};
use crate::settings::Secrets;

/// 一次会话处理所需的全部业务能力
#[derive(Clone)]
pub struct Collaborators {
    pub rasterizer: Arc<dyn PdfRasterizer>,
    pub segmenter: Arc<dyn ImageSegmenter>,
    pub extractor: Arc<dyn SectionExtractor>,
    pub af_generator: Arc<dyn AfGenerator>,
    pub packager: Arc<dyn Packager>,
}

impl Collaborators {
    /// 全部使用模拟实现
    pub fn simulated(config: &Config) -> Self {
        Self {
            rasterizer: Arc::new(SimulatedRasterizer::new()),
            segmenter: Arc::new(SimulatedSegmenter::new()),
            extractor: Arc::new(SimulatedExtractor::new()),
            af_generator: Arc::new(TemplateAfGenerator::new()),
            packager: Arc::new(ContentPackager::new(config.generated_af_dir())),
        }
    }

    /// 按配置选择提取后端
    ///
    /// 配置为 `llm` 但密钥中没有 API key 时退回模拟提取。
    pub fn for_session(config: &Config, secrets: &Secrets) -> Self {
        let mut collaborators = Self::simulated(config);
        if config.extractor_backend == ExtractorBackend::Llm {
            if secrets.api_key.trim().is_empty() {
                warn!("⚠️ 未配置 AZURE_OPENAI_API_KEY，使用模拟提取");
            } else {
                info!("🤖 使用 LLM 提取，模型: {}", secrets.model_name);
                collaborators.extractor =
                    Arc::new(LlmExtractor::new(secrets, config.llm_cost_per_1k_tokens));
            }
        }
        collaborators
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SectionExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}
