//! 打包模式配置文件与密钥文件
//!
//! 两者都是磁盘上的明文文件：
//! - 配置文件（TOML）：`[packager] mode = "sandbox" | "dev"`
//! - 密钥文件（JSON）：T 编号与模型接口凭据

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::SettingsError;

/// 打包模式：决定内容路径与包名后缀
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagerMode {
    Sandbox,
    Dev,
}

impl PackagerMode {
    pub fn parse(value: &str) -> Result<Self, SettingsError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(PackagerMode::Sandbox),
            "dev" => Ok(PackagerMode::Dev),
            _ => Err(SettingsError::InvalidPackagerMode {
                mode: value.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackagerMode::Sandbox => "sandbox",
            PackagerMode::Dev => "dev",
        }
    }

    /// `jcr_root/content/forms/af/` 下的目录名
    pub fn content_folder(self) -> &'static str {
        match self {
            PackagerMode::Sandbox => "deep_test_2",
            PackagerMode::Dev => "pdf_converted_afforms",
        }
    }

    pub fn package_suffix(self) -> &'static str {
        match self {
            PackagerMode::Sandbox => "SANDBOX",
            PackagerMode::Dev => "DEV",
        }
    }
}

impl fmt::Display for PackagerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PackagerFile {
    #[serde(default)]
    packager: PackagerSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PackagerSection {
    mode: Option<String>,
}

/// 密钥文件内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secrets {
    #[serde(rename = "T_NUMBER", default)]
    pub t_number: String,
    #[serde(rename = "AZURE_OPENAI_API_KEY", default)]
    pub api_key: String,
    #[serde(rename = "AZURE_OPENAI_ENDPOINT", default)]
    pub endpoint: String,
    #[serde(rename = "MODEL_NAME", default)]
    pub model_name: String,
    #[serde(rename = "API_VERSION", default)]
    pub api_version: String,
}

impl Secrets {
    /// 写入表单记录 `last_modified_by` 的 T 编号
    pub fn t_number(&self) -> Option<String> {
        let t = self.t_number.trim();
        (!t.is_empty()).then(|| t.to_string())
    }
}

/// `POST /api/config` 的请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub packager_mode: Option<String>,
    #[serde(default)]
    pub t_number: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// `GET /api/config` 的响应体
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub config_exists: bool,
    pub secrets_exists: bool,
    pub config: JsonValue,
    pub secrets: JsonValue,
}

/// 一次会话开始时读取的设置
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub packager_mode: PackagerMode,
    pub secrets: Secrets,
}

/// 读取配置文件中的原始打包模式（文件不存在或未设置时为 None）
pub async fn read_packager_mode(path: &Path) -> Result<Option<String>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| SettingsError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
    let file: PackagerFile = toml::from_str(&content).map_err(|source| SettingsError::TomlParseFailed {
        path: path.display().to_string(),
        source,
    })?;
    Ok(file.packager.mode)
}

/// 读取密钥文件（文件不存在时为 None）
pub async fn read_secrets(path: &Path) -> Result<Option<Secrets>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| SettingsError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
    let secrets = serde_json::from_str(&content).map_err(|source| SettingsError::JsonParseFailed {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(secrets))
}

/// 为 `GET /api/config` 组装当前设置
pub async fn load_view(config: &Config) -> Result<SettingsView, SettingsError> {
    let config_exists = config.packager_config_path.exists();
    let secrets_exists = config.secrets_path.exists();

    let mode = read_packager_mode(&config.packager_config_path).await?;
    let secrets = read_secrets(&config.secrets_path).await?;

    let config_json = if config_exists {
        serde_json::json!({ "packager_mode": mode })
    } else {
        serde_json::json!({})
    };
    let secrets_json = match secrets {
        Some(secrets) => serde_json::to_value(secrets).unwrap_or_default(),
        None => serde_json::json!({}),
    };

    Ok(SettingsView {
        config_exists,
        secrets_exists,
        config: config_json,
        secrets: secrets_json,
    })
}

/// 保存配置文件与密钥文件
pub async fn save(config: &Config, update: SettingsUpdate) -> Result<PackagerMode, SettingsError> {
    let mode = match update.packager_mode.as_deref() {
        Some(mode) if !mode.trim().is_empty() => PackagerMode::parse(mode)?,
        _ => PackagerMode::Sandbox,
    };

    let packager_file = PackagerFile {
        packager: PackagerSection {
            mode: Some(mode.as_str().to_string()),
        },
    };
    let toml_text = toml::to_string(&packager_file)?;
    write_file(&config.packager_config_path, toml_text.as_bytes()).await?;

    let secrets = Secrets {
        t_number: update.t_number.unwrap_or_default(),
        api_key: update.api_key.unwrap_or_default(),
        endpoint: update.endpoint.unwrap_or_default(),
        model_name: update.model_name.unwrap_or_default(),
        api_version: update.api_version.unwrap_or_default(),
    };
    let secrets_json = serde_json::to_string_pretty(&secrets).map_err(|source| SettingsError::JsonParseFailed {
        path: config.secrets_path.display().to_string(),
        source,
    })?;
    write_file(&config.secrets_path, secrets_json.as_bytes()).await?;

    info!("✓ 配置已保存 (打包模式: {})", mode);
    Ok(mode)
}

/// 会话开始时加载设置
///
/// 配置文件缺失时回退到 sandbox；密钥文件缺失或模式无效则报错。
pub async fn load_for_session(config: &Config) -> Result<SessionSettings, SettingsError> {
    let packager_mode = match read_packager_mode(&config.packager_config_path).await? {
        Some(mode) => PackagerMode::parse(&mode)?,
        None => PackagerMode::Sandbox,
    };

    let secrets = read_secrets(&config.secrets_path)
        .await?
        .ok_or_else(|| SettingsError::SecretsMissing {
            path: config.secrets_path.display().to_string(),
        })?;

    debug!("会话设置: 打包模式 {}", packager_mode);
    Ok(SessionSettings {
        packager_mode,
        secrets,
    })
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| SettingsError::WriteFailed {
                path: parent.display().to_string(),
                source,
            })?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|source| SettingsError::WriteFailed {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> Config {
        Config::default().with_root(root)
    }

    #[test]
    fn test_packager_mode_parse() {
        assert_eq!(PackagerMode::parse("sandbox").unwrap(), PackagerMode::Sandbox);
        assert_eq!(PackagerMode::parse("DEV").unwrap(), PackagerMode::Dev);
        assert!(PackagerMode::parse("prod").is_err());
        assert_eq!(PackagerMode::Dev.content_folder(), "pdf_converted_afforms");
        assert_eq!(PackagerMode::Sandbox.package_suffix(), "SANDBOX");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let update = SettingsUpdate {
            packager_mode: Some("dev".to_string()),
            t_number: Some("T12345".to_string()),
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        save(&config, update).await.unwrap();

        let session = load_for_session(&config).await.unwrap();
        assert_eq!(session.packager_mode, PackagerMode::Dev);
        assert_eq!(session.secrets.t_number(), Some("T12345".to_string()));

        let view = load_view(&config).await.unwrap();
        assert!(view.config_exists);
        assert!(view.secrets_exists);
        assert_eq!(view.config["packager_mode"], "dev");
        assert_eq!(view.secrets["T_NUMBER"], "T12345");
        assert_eq!(view.secrets["AZURE_OPENAI_API_KEY"], "key");
    }

    #[tokio::test]
    async fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let view = load_view(&config).await.unwrap();
        assert!(!view.config_exists);
        assert!(!view.secrets_exists);
        assert_eq!(view.secrets, serde_json::json!({}));

        assert!(matches!(
            load_for_session(&config).await,
            Err(SettingsError::SecretsMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_mode_rejected_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let update = SettingsUpdate {
            packager_mode: Some("staging".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            save(&config, update).await,
            Err(SettingsError::InvalidPackagerMode { .. })
        ));
        assert!(!config.packager_config_path.exists());
    }

    #[tokio::test]
    async fn test_hand_edited_invalid_mode_fails_session_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.packager_config_path, "[packager]\nmode = \"prod\"\n").unwrap();
        std::fs::write(&config.secrets_path, "{}").unwrap();

        assert!(matches!(
            load_for_session(&config).await,
            Err(SettingsError::InvalidPackagerMode { .. })
        ));
    }
}
