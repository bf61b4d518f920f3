use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::error::UploadError;

/// 表单代码：文件名的前四个字符，作为所有输出的主键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FormCode(String);

impl FormCode {
    pub const LEN: usize = 4;

    /// 从 PDF 文件名中提取表单代码
    ///
    /// 文件名必须以 `.pdf` 结尾（不区分大小写），且主干的前四个字符必须是字母。
    pub fn from_filename(filename: &str) -> Result<Self, UploadError> {
        if !has_pdf_extension(filename) {
            return Err(UploadError::InvalidFileType {
                filename: filename.to_string(),
            });
        }

        let stem = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(filename);

        let prefix: Vec<char> = stem.chars().take(Self::LEN).collect();
        if prefix.len() < Self::LEN || !prefix.iter().all(|c| c.is_alphabetic()) {
            return Err(UploadError::InvalidFilenameFormat {
                filename: filename.to_string(),
            });
        }

        Ok(Self(prefix.into_iter().collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 内容路径中使用的小写形式
    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }

    /// 由表单代码派生的稳定种子，模拟协作方用它代替随机数
    pub fn seed(&self) -> u64 {
        // FNV-1a
        self.0.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
            (hash ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
        })
    }
}

impl fmt::Display for FormCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn has_pdf_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// 表单字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub field_name: String,
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl FormField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>, required: bool) -> Self {
        Self {
            field_name: name.into(),
            field_type: field_type.into(),
            required,
            extra: Map::new(),
        }
    }
}

/// 普通区段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionContent {
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// 标题区段中识别出的表头信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDetails {
    pub heading: String,
    pub headers: Vec<JsonValue>,
}

impl HeaderDetails {
    pub const HEADING: &'static str = "Detected header details";

    pub fn new(headers: Vec<JsonValue>) -> Self {
        Self {
            heading: Self::HEADING.to_string(),
            headers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormSection {
    Headers(HeaderDetails),
    Content(SectionContent),
}

/// 表单记录：处理过程中逐步构建，写成 JSON 后交给 AF 生成器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    pub form_code: String,
    pub form_title: String,
    pub last_modified_date: String,
    pub last_modified_by: Option<String>,
    pub sections: Vec<FormSection>,
}

impl FormRecord {
    pub fn new(last_modified_by: Option<String>) -> Self {
        Self {
            form_code: String::new(),
            form_title: String::new(),
            last_modified_date: timestamp_now(),
            last_modified_by,
            sections: Vec::new(),
        }
    }

    /// 输出的 JSON 文件名
    pub fn json_filename(form_code: &FormCode) -> String {
        format!("{}_input_for_af.json", form_code)
    }

    /// 所有区段中的字段数量
    pub fn field_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| match s {
                FormSection::Content(c) => c.fields.len(),
                FormSection::Headers(_) => 0,
            })
            .sum()
    }
}

/// 本地时间，毫秒精度，带 `+HH:MM` 时区
pub fn timestamp_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_code_from_valid_filename() {
        let code = FormCode::from_filename("ABCD.pdf").unwrap();
        assert_eq!(code.as_str(), "ABCD");
        assert_eq!(code.lowercase(), "abcd");

        let code = FormCode::from_filename("WxYz_application_form.PDF").unwrap();
        assert_eq!(code.as_str(), "WxYz");
    }

    #[test]
    fn test_form_code_rejects_non_alphabetic_prefix() {
        assert!(matches!(
            FormCode::from_filename("1bcd.pdf"),
            Err(UploadError::InvalidFilenameFormat { .. })
        ));
        assert!(matches!(
            FormCode::from_filename("ab_d.pdf"),
            Err(UploadError::InvalidFilenameFormat { .. })
        ));
        assert!(matches!(
            FormCode::from_filename("abc.pdf"),
            Err(UploadError::InvalidFilenameFormat { .. })
        ));
    }

    #[test]
    fn test_form_code_rejects_wrong_extension() {
        assert!(matches!(
            FormCode::from_filename("ABCD.docx"),
            Err(UploadError::InvalidFileType { .. })
        ));
        assert!(matches!(
            FormCode::from_filename("ABCD"),
            Err(UploadError::InvalidFileType { .. })
        ));
    }

    #[test]
    fn test_seed_is_stable() {
        let a = FormCode::from_filename("ABCD.pdf").unwrap();
        let b = FormCode::from_filename("ABCD_v2.pdf").unwrap();
        assert_eq!(a.seed(), b.seed());
        assert_ne!(a.seed(), FormCode::from_filename("ABCE.pdf").unwrap().seed());
    }

    #[test]
    fn test_form_section_untagged_roundtrip() {
        let json = serde_json::json!([
            {"heading": "Detected header details", "headers": [{"agency": "DMV"}]},
            {"section_title": "Applicant", "fields": [
                {"field_name": "name", "field_type": "text", "required": true, "max_length": 40}
            ]}
        ]);
        let sections: Vec<FormSection> = serde_json::from_value(json).unwrap();
        assert!(matches!(sections[0], FormSection::Headers(_)));
        match &sections[1] {
            FormSection::Content(c) => {
                assert_eq!(c.section_title, "Applicant");
                assert_eq!(c.fields[0].extra["max_length"], 40);
            }
            other => panic!("unexpected section: {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp_now();
        // 2024-01-02T03:04:05.678+01:00
        assert_eq!(ts.len(), 29);
        let sign = ts.as_bytes()[23];
        assert!(sign == b'+' || sign == b'-');
        assert_eq!(&ts[26..27], ":");
    }
}
