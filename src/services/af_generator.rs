//! AF 内容生成 - 业务能力层
//!
//! 只负责"把表单 JSON 变成 AF `.content.xml`"能力，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::models::{FormField, FormRecord, FormSection, HeaderDetails, SectionContent};

const NS_SLING: &str = "http://sling.apache.org/jcr/sling/1.0";
const NS_CQ: &str = "http://www.day.com/jcr/cq/1.0";
const NS_JCR: &str = "http://www.jcp.org/jcr/1.0";
const NS_NT: &str = "http://www.jcp.org/jcr/nt/1.0";
const NS_FD: &str = "http://www.adobe.com/aemfd/fd/1.0";

/// AF 生成端口
#[async_trait]
pub trait AfGenerator: Send + Sync {
    /// 读取表单 JSON 文件，返回 `.content.xml` 内容
    async fn generate(&self, json_path: &Path) -> Result<String>;
}

/// 基于固定模板的 AF 生成器
#[derive(Debug, Default, Clone)]
pub struct TemplateAfGenerator;

impl TemplateAfGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AfGenerator for TemplateAfGenerator {
    async fn generate(&self, json_path: &Path) -> Result<String> {
        let content = tokio::fs::read_to_string(json_path)
            .await
            .with_context(|| format!("无法读取表单JSON: {}", json_path.display()))?;
        let record: FormRecord = serde_json::from_str(&content)
            .with_context(|| format!("无法解析表单JSON: {}", json_path.display()))?;

        let xml = render_content_xml(&record)?;
        debug!("已生成 {} 的 AF 内容 ({} 字节)", record.form_code, xml.len());
        Ok(xml)
    }
}

/// 将表单记录渲染为 AF `.content.xml`
pub fn render_content_xml(record: &FormRecord) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let title = if record.form_title.trim().is_empty() {
        "Generated Form"
    } else {
        record.form_title.as_str()
    };

    let mut root = BytesStart::new("jcr:root");
    root.push_attribute(("xmlns:sling", NS_SLING));
    root.push_attribute(("xmlns:cq", NS_CQ));
    root.push_attribute(("xmlns:jcr", NS_JCR));
    root.push_attribute(("xmlns:nt", NS_NT));
    root.push_attribute(("xmlns:fd", NS_FD));
    root.push_attribute(("jcr:primaryType", "cq:Page"));
    writer.write_event(Event::Start(root))?;

    let mut content = BytesStart::new("jcr:content");
    content.push_attribute(("jcr:primaryType", "cq:PageContent"));
    content.push_attribute(("sling:resourceType", "fd/af/components/page/base"));
    content.push_attribute(("cq:template", "/libs/fd/af/templates/surveyTemplate"));
    content.push_attribute(("jcr:title", title));
    content.push_attribute(("fd:formCode", record.form_code.as_str()));
    content.push_attribute(("cq:lastModified", format!("{{Date}}{}", record.last_modified_date).as_str()));
    if let Some(by) = &record.last_modified_by {
        content.push_attribute(("cq:lastModifiedBy", by.as_str()));
    }
    writer.write_event(Event::Start(content))?;
    writer.write_event(Event::Comment(BytesText::new(&format!(
        " Generated AF content for {} ",
        record.form_code
    ))))?;

    let mut container = node("guideContainer", "fd/af/components/guideContainer");
    container.push_attribute(("guideNodeClass", "guideContainerNode"));
    writer.write_event(Event::Start(container))?;

    let mut root_panel = node("rootPanel", "fd/af/components/rootPanel");
    root_panel.push_attribute(("guideNodeClass", "rootPanelNode"));
    root_panel.push_attribute(("jcr:title", title));
    writer.write_event(Event::Start(root_panel))?;

    writer.write_event(Event::Start(items_node()))?;
    for (i, section) in record.sections.iter().enumerate() {
        let panel_name = format!("panel_{}", i + 1);
        match section {
            FormSection::Headers(headers) => write_header_panel(&mut writer, &panel_name, headers)?,
            FormSection::Content(content) => write_section_panel(&mut writer, &panel_name, content)?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new("items")))?;

    writer.write_event(Event::End(BytesEnd::new("rootPanel")))?;
    writer.write_event(Event::End(BytesEnd::new("guideContainer")))?;
    writer.write_event(Event::End(BytesEnd::new("jcr:content")))?;
    writer.write_event(Event::End(BytesEnd::new("jcr:root")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn write_section_panel(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    panel_name: &str,
    section: &SectionContent,
) -> Result<()> {
    let mut panel = node(panel_name, "fd/af/components/panel");
    panel.push_attribute(("guideNodeClass", "guidePanel"));
    panel.push_attribute(("name", panel_name));
    panel.push_attribute(("jcr:title", section.section_title.as_str()));
    writer.write_event(Event::Start(panel))?;

    writer.write_event(Event::Start(items_node()))?;
    let mut used = HashSet::new();
    for field in &section.fields {
        let name = unique_node_name(&field.field_name, &mut used);
        writer.write_event(Event::Empty(field_node(&name, field)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("items")))?;

    writer.write_event(Event::End(BytesEnd::new(panel_name)))?;
    Ok(())
}

fn write_header_panel(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    panel_name: &str,
    headers: &HeaderDetails,
) -> Result<()> {
    let mut panel = node(panel_name, "fd/af/components/panel");
    panel.push_attribute(("guideNodeClass", "guidePanel"));
    panel.push_attribute(("name", panel_name));
    panel.push_attribute(("jcr:title", headers.heading.as_str()));
    writer.write_event(Event::Start(panel))?;

    writer.write_event(Event::Start(items_node()))?;
    for (i, header) in headers.headers.iter().enumerate() {
        let name = format!("header_{}", i + 1);
        let text = match header {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{}: {}", k, s),
                    other => format!("{}: {}", k, other),
                })
                .collect::<Vec<_>>()
                .join("; "),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut draw = node(&name, "fd/af/components/guidetextdraw");
        draw.push_attribute(("guideNodeClass", "guideTextDraw"));
        draw.push_attribute(("name", name.as_str()));
        draw.push_attribute(("jcr:title", text.as_str()));
        writer.write_event(Event::Empty(draw))?;
    }
    writer.write_event(Event::End(BytesEnd::new("items")))?;

    writer.write_event(Event::End(BytesEnd::new(panel_name)))?;
    Ok(())
}

fn node<'a>(name: &'a str, resource_type: &str) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("jcr:primaryType", "nt:unstructured"));
    start.push_attribute(("sling:resourceType", resource_type));
    start
}

fn items_node() -> BytesStart<'static> {
    let mut items = BytesStart::new("items");
    items.push_attribute(("jcr:primaryType", "nt:unstructured"));
    items
}

fn field_node<'a>(name: &'a str, field: &FormField) -> BytesStart<'a> {
    let (resource_type, node_class) = component_for(&field.field_type);
    let mut start = node(name, resource_type);
    start.push_attribute(("guideNodeClass", node_class));
    start.push_attribute(("name", name));
    start.push_attribute(("jcr:title", field.field_name.as_str()));
    if field.required {
        start.push_attribute(("required", "{Boolean}true"));
    }
    start
}

/// 字段类型 → (sling:resourceType, guideNodeClass)
pub fn component_for(field_type: &str) -> (&'static str, &'static str) {
    match field_type.trim().to_ascii_lowercase().as_str() {
        "checkbox" => ("fd/af/components/guidecheckbox", "guideCheckBox"),
        "radio" | "radiobutton" => ("fd/af/components/guideradiobutton", "guideRadioButton"),
        "date" => ("fd/af/components/guidedatepicker", "guideDatePicker"),
        "dropdown" | "select" => ("fd/af/components/guidedropdownlist", "guideDropDownList"),
        "signature" => ("fd/af/components/guidescribble", "guideScribble"),
        "number" | "numeric" => ("fd/af/components/guidenumericbox", "guideNumericBox"),
        "textarea" | "multiline" => ("fd/af/components/guidetextbox", "guideTextBox"),
        _ => ("fd/af/components/guidetextbox", "guideTextBox"),
    }
}

/// 字段名 → 合法且不重复的 JCR 节点名
pub fn unique_node_name(field_name: &str, used: &mut HashSet<String>) -> String {
    let mut base: String = field_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if base.is_empty() {
        base = "field".to_string();
    }
    if base.starts_with(|c: char| c.is_ascii_digit()) {
        base = format!("f_{}", base);
    }

    let mut name = base.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        n += 1;
        name = format!("{}_{}", base, n);
    }
    name
}
