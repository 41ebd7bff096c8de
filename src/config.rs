use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR_NAME: &str = "session-gate";

/// API接続設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// APIベースURL（省略可、デフォルト: http://localhost:3000/api/v1）
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// 通信失敗時（ステータスなし）の再試行回数
    #[serde(default = "default_api_retry_count")]
    pub retry_count: u32,

    /// リクエストタイムアウト（秒）
    #[serde(default = "default_api_timeout_sec")]
    pub timeout_sec: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api/v1".to_string()
}

fn default_api_retry_count() -> u32 {
    1
}

fn default_api_timeout_sec() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            retry_count: default_api_retry_count(),
            timeout_sec: default_api_timeout_sec(),
        }
    }
}

/// 資格情報ストアの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OSのキーチェーン（使えない場合はファイルにフォールバック）
    #[default]
    Keyring,
    /// JSONファイル
    File,
    /// メモリのみ（再起動で消える）
    Memory,
}

/// ストレージ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 使用するストア
    #[serde(default)]
    pub backend: StorageBackend,

    /// キーチェーンのサービス名
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// 資格情報ファイルのパス（省略可、デフォルト: 設定ディレクトリ下の credentials.json）
    #[serde(default)]
    pub file_path: Option<String>,
}

fn default_service_name() -> String {
    APP_DIR_NAME.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            service_name: default_service_name(),
            file_path: None,
        }
    }
}

/// 通知設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    /// デスクトップ通知を使うかどうか（false の場合は標準エラー出力）
    #[serde(default)]
    pub desktop: bool,
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// ログレベル（省略可、デフォルト: info）
    #[serde(default = "default_log_level")]
    pub level: String,

    /// ログファイルのパス（省略時は標準エラー出力）
    #[serde(default)]
    pub file_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: None,
        }
    }
}

/// メイン設定構造体
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API接続設定
    #[serde(default)]
    pub api: ApiConfig,

    /// ストレージ設定
    #[serde(default)]
    pub storage: StorageConfig,

    /// 通知設定
    #[serde(default)]
    pub notification: NotificationConfig,

    /// ログ設定
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn api_base_url(&self) -> &str {
        &self.api.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_sec)
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    pub fn log_file_path(&self) -> &Option<String> {
        &self.logging.file_path
    }

    /// 資格情報ファイルのパス（未指定ならデフォルト）
    pub fn credentials_file_path(&self) -> PathBuf {
        match &self.storage.file_path {
            Some(path) => PathBuf::from(path),
            None => app_dir().join("credentials.json"),
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// 設定ファイルのデフォルトパスを取得
pub fn config_file_path() -> PathBuf {
    app_dir().join("config.toml")
}

/// 設定ファイルを読み込む（存在しない場合はデフォルト設定）
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);

    if config_path.exists() {
        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

/// 設定ファイルを保存する
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent_dir) = path.parent() {
        // 設定ディレクトリが存在しない場合は作成
        fs::create_dir_all(parent_dir).map_err(|e| ConfigError::WriteError { source: e })?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError { source: e })?;
    fs::write(path, contents).map_err(|e| ConfigError::WriteError { source: e })?;
    Ok(())
}
