//! 表单 JSON 写入 - 业务能力层

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::models::{FormCode, FormRecord};

/// 规范化字符串：去首尾空白，合并连续空白，去掉控制字符
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 递归规范化 JSON 中的所有字符串值
pub fn normalize_value(value: &mut JsonValue) {
    match value {
        JsonValue::String(s) => *s = normalize_text(s),
        JsonValue::Array(items) => items.iter_mut().for_each(normalize_value),
        JsonValue::Object(map) => map.values_mut().for_each(normalize_value),
        _ => {}
    }
}

/// 将表单记录规范化后写成 `{CODE}_input_for_af.json`，返回文件路径
pub async fn write_form_json(record: &FormRecord, form_code: &FormCode, json_dir: &Path) -> Result<PathBuf> {
    let mut value = serde_json::to_value(record)?;
    normalize_value(&mut value);

    fs::create_dir_all(json_dir)
        .await
        .with_context(|| format!("无法创建JSON输出目录: {}", json_dir.display()))?;

    let path = json_dir.join(FormRecord::json_filename(form_code));
    let content = serde_json::to_string_pretty(&value)?;
    fs::write(&path, content)
        .await
        .with_context(|| format!("无法写入JSON文件: {}", path.display()))?;

    Ok(path)
}
