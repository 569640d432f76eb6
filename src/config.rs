use std::path::Path;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 程序配置
///
/// 优先级：环境变量 > 配置文件 > 默认值
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// 拆分服务地址
    pub api_base_url: String,
    /// 下载文件保存目录
    pub download_dir: String,
    /// 请求超时（秒），不设置则交给底层连接自行处理
    pub request_timeout_secs: Option<u64>,
    /// 请求头中的 User-Agent
    pub user_agent: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            download_dir: "downloads".to_string(),
            request_timeout_secs: None,
            user_agent: concat!("pdf-splitter-client/", env!("CARGO_PKG_VERSION")).to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// 读取配置文件（可选），再叠加环境变量
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileUnreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| {
            ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            }
            .into()
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 用外部键值覆盖配置；无法解析的值保持原样
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_base_url: lookup("SPLITTER_API_BASE_URL").unwrap_or(self.api_base_url),
            download_dir: lookup("DOWNLOAD_DIR").unwrap_or(self.download_dir),
            request_timeout_secs: lookup("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .or(self.request_timeout_secs),
            user_agent: lookup("SPLITTER_USER_AGENT").unwrap_or(self.user_agent),
            verbose_logging: lookup("VERBOSE_LOGGING")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.verbose_logging),
        }
    }
}
