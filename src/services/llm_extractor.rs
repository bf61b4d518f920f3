//! LLM 区段提取 - 业务能力层
//!
//! 只负责"让模型读一张区段图片并返回 JSON"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;
use tracing::{debug, warn};

use crate::models::FormCode;
use crate::services::extractor::{parse_reply, Extraction, SectionExtractor};
use crate::services::segmenter::{first_image, SectionImage, SectionKind};
use crate::settings::Secrets;
use crate::utils::logging::truncate_text;

const TITLE_SYSTEM_PROMPT: &str = "You read scanned government and business forms. \
Return only JSON, no commentary.";

const TITLE_USER_PROMPT: &str = r#"This image is the title area of a form.
Return a JSON array. The first element must be {"form_title": "<the form title>"}.
Add one object per additional header detail you can read (agency, form number, revision date, ...)."#;

const SECTION_USER_PROMPT: &str = r#"This image is one section of a form.
Return a JSON object:
{"section_title": "<title or empty>", "fields": [{"field_name": "...", "field_type": "text|checkbox|radio|date|signature|dropdown", "required": true|false}]}"#;

/// LLM 区段提取
///
/// 职责：
/// - 把区段图片以 base64 data URL 发给模型
/// - 解析模型返回的 JSON
/// - 按 usage 统计 token 与费用
pub struct LlmExtractor {
    client: Client<OpenAIConfig>,
    model_name: String,
    cost_per_1k_tokens: f64,
}

impl LlmExtractor {
    /// 使用密钥文件中的凭据创建
    pub fn new(secrets: &Secrets, cost_per_1k_tokens: f64) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let mut openai_config = OpenAIConfig::new().with_api_key(&secrets.api_key);
        if !secrets.endpoint.trim().is_empty() {
            openai_config = openai_config.with_api_base(&secrets.endpoint);
        }

        Self {
            client: Client::with_config(openai_config),
            model_name: secrets.model_name.clone(),
            cost_per_1k_tokens,
        }
    }

    /// 发送一条带图片的消息，返回 (响应内容, 使用的 token 数)
    async fn send_image(&self, system_message: &str, user_message: &str, image_url: String) -> Result<(String, u64)> {
        debug!("调用 LLM API，模型: {}", self.model_name);

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()?;

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: user_message.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image_url,
                        detail: Some(ImageDetail::High),
                    },
                },
            ),
        ];
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.0)
            .max_tokens(2048u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        let tokens = response
            .usage
            .as_ref()
            .map(|u| u.total_tokens as u64)
            .unwrap_or(0);

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        debug!("LLM 响应: {}", truncate_text(&content, 120));
        Ok((content.trim().to_string(), tokens))
    }
}

#[async_trait]
impl SectionExtractor for LlmExtractor {
    async fn extract(&self, form_code: &FormCode, section: &SectionImage) -> Result<Extraction> {
        let image_path = first_image(&section.path)
            .await?
            .with_context(|| format!("区段目录中没有图片: {}", section.path.display()))?;
        let image_url = image_data_url(&image_path).await?;

        let user_message = match section.kind {
            SectionKind::Title => TITLE_USER_PROMPT,
            SectionKind::Body => SECTION_USER_PROMPT,
        };

        let (reply, tokens) = self
            .send_image(TITLE_SYSTEM_PROMPT, user_message, image_url)
            .await?;
        let cost = tokens as f64 / 1000.0 * self.cost_per_1k_tokens;

        let content = parse_reply(section.kind, &reply);
        if content.is_none() {
            warn!(
                "[{}] 区段 {} 无法解析，跳过: {}",
                form_code,
                section.index,
                truncate_text(&reply, 80)
            );
        }

        Ok(Extraction {
            content,
            tokens,
            cost,
        })
    }
}

/// 读取图片并编码为 data URL
pub async fn image_data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("无法读取图片: {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}
