//! 内容包打包 - 业务能力层
//!
//! 只负责"把 AF 内容写成可导入的内容包压缩文件"能力，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::FormCode;
use crate::settings::PackagerMode;

/// 打包产物
#[derive(Debug, Clone, PartialEq)]
pub struct PackageArtifact {
    /// `{CODE}_{SANDBOX|DEV}`
    pub package_name: String,
    pub archive_path: PathBuf,
}

/// 打包端口
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        form_code: &FormCode,
        mode: PackagerMode,
        last_modified: &str,
        last_modified_by: Option<&str>,
        content_xml: &str,
    ) -> Result<PackageArtifact>;
}

/// 内容包打包器
///
/// 每次打包在 `generated_af_dir/.{CODE}-XXXXXX/` 临时目录下搭建目录结构：
/// ```text
/// jcr_root/content/forms/af/{deep_test_2|pdf_converted_afforms}/{code}/.content.xml
/// META-INF/vault/filter.xml
/// META-INF/vault/properties.xml
/// ```
/// 先压缩到同目录下的临时文件，再重命名为 `generated_af_dir/{CODE}_{SUFFIX}.zip`，
/// 同一表单代码的并发打包互不干扰。
#[derive(Debug, Clone)]
pub struct ContentPackager {
    generated_af_dir: PathBuf,
}

impl ContentPackager {
    pub fn new(generated_af_dir: impl Into<PathBuf>) -> Self {
        Self {
            generated_af_dir: generated_af_dir.into(),
        }
    }

    /// 表单在内容仓库中的路径
    pub fn content_path(form_code: &FormCode, mode: PackagerMode) -> String {
        format!(
            "/content/forms/af/{}/{}",
            mode.content_folder(),
            form_code.lowercase()
        )
    }
}

#[async_trait]
impl Packager for ContentPackager {
    async fn package(
        &self,
        form_code: &FormCode,
        mode: PackagerMode,
        last_modified: &str,
        last_modified_by: Option<&str>,
        content_xml: &str,
    ) -> Result<PackageArtifact> {
        let package_name = format!("{}_{}", form_code, mode.package_suffix());
        let content_path = Self::content_path(form_code, mode);

        fs::create_dir_all(&self.generated_af_dir)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.generated_af_dir.display()))?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", form_code))
            .tempdir_in(&self.generated_af_dir)
            .context("无法创建打包临时目录")?;

        let form_dir = staging
            .path()
            .join("jcr_root")
            .join(content_path.trim_start_matches('/'));
        fs::create_dir_all(&form_dir)
            .await
            .with_context(|| format!("无法创建打包目录: {}", form_dir.display()))?;
        fs::write(form_dir.join(".content.xml"), content_xml).await?;

        let vault_dir = staging.path().join("META-INF").join("vault");
        fs::create_dir_all(&vault_dir).await?;
        fs::write(vault_dir.join("filter.xml"), filter_xml(&content_path)?).await?;
        fs::write(
            vault_dir.join("properties.xml"),
            properties_xml(&package_name, last_modified, last_modified_by)?,
        )
        .await?;

        let archive_path = self.generated_af_dir.join(format!("{}.zip", package_name));
        let (src, dst) = (staging.path().to_path_buf(), archive_path.clone());
        tokio::task::spawn_blocking(move || write_archive(&src, &dst))
            .await
            .context("打包任务异常退出")??;

        staging.close().context("无法删除打包临时目录")?;
        debug!("已生成内容包: {}", archive_path.display());

        Ok(PackageArtifact {
            package_name,
            archive_path,
        })
    }
}

fn filter_xml(content_path: &str) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("workspaceFilter");
    root.push_attribute(("version", "1.0"));
    writer.write_event(Event::Start(root))?;
    let mut filter = BytesStart::new("filter");
    filter.push_attribute(("root", content_path));
    writer.write_event(Event::Empty(filter))?;
    writer.write_event(Event::End(BytesEnd::new("workspaceFilter")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn properties_xml(package_name: &str, last_modified: &str, last_modified_by: Option<&str>) -> Result<String> {
    let by = last_modified_by.unwrap_or("admin");
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("no"))))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(
        r#"properties SYSTEM "http://java.sun.com/dtd/properties.dtd""#,
    )))?;

    writer.write_event(Event::Start(BytesStart::new("properties")))?;
    for (key, value) in [
        ("name", package_name),
        ("group", "pdf_converted_afforms"),
        ("version", "1.0"),
        ("lastModified", last_modified),
        ("lastModifiedBy", by),
    ] {
        let mut entry = BytesStart::new("entry");
        entry.push_attribute(("key", key));
        writer.write_event(Event::Start(entry))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new("entry")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("properties")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// 压缩到目标目录下的临时文件，完成后重命名到 `archive_path`
fn write_archive(src_dir: &Path, archive_path: &Path) -> Result<()> {
    let parent = archive_path
        .parent()
        .with_context(|| format!("无效的压缩文件路径: {}", archive_path.display()))?;
    let tmp = tempfile::Builder::new()
        .prefix(".zip-")
        .suffix(".part")
        .tempfile_in(parent)
        .context("无法创建临时压缩文件")?;
    zip_dir(src_dir, tmp.as_file().try_clone()?)?;
    tmp.persist(archive_path)
        .with_context(|| format!("无法写入压缩文件: {}", archive_path.display()))?;
    Ok(())
}

/// 将目录递归压缩进 `file`，条目路径相对于 `src_dir`，统一使用 `/`
pub fn zip_dir(src_dir: &Path, file: File) -> Result<()> {
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut pending = vec![src_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = std::fs::read_dir(&dir)?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let relative = path
                .strip_prefix(src_dir)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type()?.is_dir() {
                zip.add_directory(format!("{}/", relative), options)?;
                pending.push(path);
            } else {
                zip.start_file(relative, options)?;
                zip.write_all(&std::fs::read(&path)?)?;
            }
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_entry(archive_path: &Path, name: &str) -> String {
        let mut archive = zip::ZipArchive::new(File::open(archive_path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        content
    }

    #[tokio::test]
    async fn test_package_sandbox_layout() {
        let dir = tempfile::tempdir().unwrap();
        let packager = ContentPackager::new(dir.path());
        let code = FormCode::from_filename("ABCD.pdf").unwrap();

        let artifact = packager
            .package(&code, PackagerMode::Sandbox, "2024-05-01T10:00:00.000+00:00", Some("T1"), "<jcr:root/>")
            .await
            .unwrap();

        assert_eq!(artifact.package_name, "ABCD_SANDBOX");
        assert_eq!(artifact.archive_path, dir.path().join("ABCD_SANDBOX.zip"));
        assert!(!dir.path().join("ABCD").exists());

        let xml = read_entry(
            &artifact.archive_path,
            "jcr_root/content/forms/af/deep_test_2/abcd/.content.xml",
        );
        assert_eq!(xml, "<jcr:root/>");

        let filter = read_entry(&artifact.archive_path, "META-INF/vault/filter.xml");
        assert!(filter.contains("/content/forms/af/deep_test_2/abcd"));
        let properties = read_entry(&artifact.archive_path, "META-INF/vault/properties.xml");
        assert!(properties.contains("<entry key=\"lastModifiedBy\">T1</entry>"));
    }

    #[tokio::test]
    async fn test_package_dev_layout() {
        let dir = tempfile::tempdir().unwrap();
        let packager = ContentPackager::new(dir.path());
        let code = FormCode::from_filename("WxYz.pdf").unwrap();

        let artifact = packager
            .package(&code, PackagerMode::Dev, "2024-05-01", None, "<x/>")
            .await
            .unwrap();

        assert_eq!(artifact.package_name, "WxYz_DEV");
        let xml = read_entry(
            &artifact.archive_path,
            "jcr_root/content/forms/af/pdf_converted_afforms/wxyz/.content.xml",
        );
        assert_eq!(xml, "<x/>");
        let properties = read_entry(&artifact.archive_path, "META-INF/vault/properties.xml");
        assert!(properties.contains("<entry key=\"lastModifiedBy\">admin</entry>"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_packaging_same_code() {
        let dir = tempfile::tempdir().unwrap();
        let packager = std::sync::Arc::new(ContentPackager::new(dir.path()));
        let code = FormCode::from_filename("ABCD.pdf").unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let packager = packager.clone();
                let code = code.clone();
                tokio::spawn(async move {
                    let by = format!("T{}", i);
                    packager
                        .package(&code, PackagerMode::Sandbox, "2024-05-01", Some(&by), "<jcr:root/>")
                        .await
                })
            })
            .collect();

        for handle in handles {
            let artifact = handle.await.unwrap().unwrap();
            assert_eq!(artifact.archive_path, dir.path().join("ABCD_SANDBOX.zip"));
        }

        let xml = read_entry(
            &dir.path().join("ABCD_SANDBOX.zip"),
            "jcr_root/content/forms/af/deep_test_2/abcd/.content.xml",
        );
        assert_eq!(xml, "<jcr:root/>");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["ABCD_SANDBOX.zip".to_string()]);
    }

    #[test]
    fn test_vault_xml_escapes_values() {
        let properties = properties_xml("ABCD_DEV", "2024-05-01", Some("T<1> & \"x\"")).unwrap();
        assert!(properties.contains("<!DOCTYPE properties SYSTEM"));
        assert!(properties.contains("T&lt;1&gt; &amp; &quot;x&quot;"));
        assert!(properties.contains("<entry key=\"group\">pdf_converted_afforms</entry>"));

        let filter = filter_xml("/content/forms/af/a\"b").unwrap();
        assert!(filter.contains("<filter root=\"/content/forms/af/a&quot;b\"/>"));
    }
}
