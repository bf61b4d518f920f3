//! 区段提取 - 业务能力层
//!
//! 只负责"从一个区段图片中提取结构化内容"能力，不关心流程

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::models::{FormCode, FormField, SectionContent};
use crate::services::segmenter::{SectionImage, SectionKind};
use crate::utils::SeededRng;

/// 每个 token 的模拟费用
pub const SIMULATED_COST_PER_TOKEN: f64 = 0.00001;

/// 提取出的区段内容
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedSection {
    /// 标题区段：表单标题，外加可能识别出的表头信息
    Title {
        form_title: String,
        headers: Vec<JsonValue>,
    },
    Body(SectionContent),
}

/// 一次提取的结果
///
/// `content` 为 None 表示该区段无法处理（跳过），但 token 和费用照常计入。
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub content: Option<ExtractedSection>,
    pub tokens: u64,
    pub cost: f64,
}

/// 区段提取端口
#[async_trait]
pub trait SectionExtractor: Send + Sync {
    async fn extract(&self, form_code: &FormCode, section: &SectionImage) -> Result<Extraction>;
}

/// 模拟提取：固定样例字段，token 数由表单代码和区段序号决定
#[derive(Debug, Default, Clone)]
pub struct SimulatedExtractor;

impl SimulatedExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SectionExtractor for SimulatedExtractor {
    async fn extract(&self, form_code: &FormCode, section: &SectionImage) -> Result<Extraction> {
        let mut rng = SeededRng::new(form_code.seed() ^ (section.index as u64 + 1).wrapping_mul(0x9e37_79b9));
        let tokens = rng.range_inclusive(100, 1000);
        let cost = tokens as f64 * SIMULATED_COST_PER_TOKEN;

        let name = section
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let content = match section.kind {
            SectionKind::Title => ExtractedSection::Title {
                form_title: format!("Sample Form Title for {}", name),
                headers: Vec::new(),
            },
            SectionKind::Body => ExtractedSection::Body(SectionContent {
                section_title: format!("Section from {}", name),
                fields: vec![
                    FormField::new("sample_field_1", "text", true),
                    FormField::new("sample_field_2", "checkbox", false),
                ],
                extra: Default::default(),
            }),
        };

        debug!("已处理 {} 区段: {} (模拟)", section.kind.as_str(), name);

        Ok(Extraction {
            content: Some(content),
            tokens,
            cost,
        })
    }
}

/// 解析模型返回的区段内容
///
/// - 允许 ```json 代码块包裹
/// - 标题区段：数组的第一个元素带 `form_title`，其余元素为表头信息；也接受单个对象
/// - 普通区段：一个对象
///
/// 无法解析时返回 None（该区段会被跳过）。
pub fn parse_reply(kind: SectionKind, reply: &str) -> Option<ExtractedSection> {
    let text = strip_code_fence(reply);
    if text.is_empty() {
        return None;
    }

    let value: JsonValue = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("无法解析模型响应为 JSON: {}", e);
            return None;
        }
    };

    match kind {
        SectionKind::Title => {
            let (first, rest) = match value {
                JsonValue::Array(items) => {
                    let mut iter = items.into_iter();
                    let first = iter.next()?;
                    (first, iter.collect::<Vec<_>>())
                }
                obj @ JsonValue::Object(_) => (obj, Vec::new()),
                _ => return None,
            };
            let form_title = first.get("form_title")?.as_str()?.trim().to_string();
            Some(ExtractedSection::Title {
                form_title,
                headers: rest,
            })
        }
        SectionKind::Body => {
            let value = match value {
                JsonValue::Array(items) if items.len() == 1 => items.into_iter().next()?,
                other => other,
            };
            if !value.is_object() {
                return None;
            }
            serde_json::from_value::<SectionContent>(value).ok().map(ExtractedSection::Body)
        }
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 去掉语言标记行
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn section(index: usize, kind: SectionKind) -> SectionImage {
        let name = match kind {
            SectionKind::Title => "section_0_title".to_string(),
            SectionKind::Body => format!("section_{}", index),
        };
        SectionImage {
            index,
            kind,
            path: PathBuf::from("/tmp/ABCD_sections").join(name),
        }
    }

    #[tokio::test]
    async fn test_simulated_extractor_title_and_body() {
        let code = FormCode::from_filename("ABCD.pdf").unwrap();
        let extractor = SimulatedExtractor::new();

        let title = extractor.extract(&code, &section(0, SectionKind::Title)).await.unwrap();
        assert!(matches!(
            title.content,
            Some(ExtractedSection::Title { ref form_title, .. }) if form_title.ends_with("section_0_title")
        ));
        assert!((100..=1000).contains(&title.tokens));
        assert!((title.cost - title.tokens as f64 * SIMULATED_COST_PER_TOKEN).abs() < 1e-12);

        let body = extractor.extract(&code, &section(1, SectionKind::Body)).await.unwrap();
        match body.content {
            Some(ExtractedSection::Body(content)) => assert_eq!(content.fields.len(), 2),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_parse_title_with_headers() {
        let reply = "```json\n[{\"form_title\": \"Vehicle Registration\"}, {\"agency\": \"DMV\"}]\n```";
        match parse_reply(SectionKind::Title, reply) {
            Some(ExtractedSection::Title { form_title, headers }) => {
                assert_eq!(form_title, "Vehicle Registration");
                assert_eq!(headers.len(), 1);
                assert_eq!(headers[0]["agency"], "DMV");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_title_object() {
        let reply = r#"{"form_title": "  Change of Address "}"#;
        assert!(matches!(
            parse_reply(SectionKind::Title, reply),
            Some(ExtractedSection::Title { ref form_title, ref headers }) if form_title == "Change of Address" && headers.is_empty()
        ));
    }

    #[test]
    fn test_parse_body_section() {
        let reply = r#"{"section_title": "Applicant", "fields": [{"field_name": "name", "field_type": "text", "required": true}]}"#;
        match parse_reply(SectionKind::Body, reply) {
            Some(ExtractedSection::Body(content)) => {
                assert_eq!(content.section_title, "Applicant");
                assert!(content.fields[0].required);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_reply_rejects_garbage() {
        assert_eq!(parse_reply(SectionKind::Body, ""), None);
        assert_eq!(parse_reply(SectionKind::Body, "I cannot read this image"), None);
        assert_eq!(parse_reply(SectionKind::Title, r#"[{"title": "x"}]"#), None);
        assert_eq!(parse_reply(SectionKind::Body, "[1, 2]"), None);
    }
}
