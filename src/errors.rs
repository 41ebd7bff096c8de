use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// エラー分類（画面遷移・通知の扱いを決める）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 入力不正。その場で表示し、遷移には影響しない
    Validation,
    /// 401/403 相当。Unauthorized Interceptor がセッションを破棄する
    AuthenticationFailure,
    /// 資格情報ストアの読み書き失敗。未ログイン扱い
    StorageFailure,
    /// その他の通信失敗。一時的な通知のみ
    NetworkFailure,
}

/// アプリケーション全体のエラー型
#[derive(Error, Debug)]
pub enum AppError {
    /// ストレージ関連エラー
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// API関連エラー
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// ログイン関連エラー
    #[error("Login error: {0}")]
    Login(#[from] LoginError),

    /// 設定関連エラー
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 汎用エラー
    #[error("{message}")]
    Generic { message: String },
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Store(e) => e.class(),
            AppError::Api(e) => e.class(),
            AppError::Login(e) => e.class(),
            AppError::Config(_) | AppError::Generic { .. } => ErrorClass::NetworkFailure,
        }
    }
}

/// 資格情報ストア関連エラー
#[derive(Error, Debug)]
pub enum StoreError {
    /// Keyring操作エラー
    #[error("Keyring error: {source}")]
    KeyringError {
        #[source]
        source: keyring::Error,
    },

    /// ファイル入出力エラー
    #[error("Credential file error: {source}")]
    IoError {
        #[source]
        source: std::io::Error,
    },

    /// JSONパースエラー
    #[error("Credential encoding error: {source}")]
    JsonError {
        #[source]
        source: serde_json::Error,
    },

    /// ストアが利用できない
    #[error("Credential store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::StorageFailure
    }
}

/// API関連エラー
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTPリクエストエラー（ステータスなし）
    #[error("Request error: {source}")]
    RequestError {
        #[source]
        source: reqwest::Error,
    },

    /// 2xx 以外のレスポンス
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// ログイン成功レスポンスに Authorization ヘッダーがない
    #[error("Login response is missing the authorization header")]
    MissingAuthorizationHeader,

    /// 認証付きリクエストなのにトークンが保存されていない
    #[error("No session token is stored")]
    MissingToken,

    /// URL組み立てエラー
    #[error("Invalid URL: {source}")]
    InvalidUrl {
        #[source]
        source: url::ParseError,
    },

    /// レスポンスパースエラー
    #[error("Response parsing failed: {source}")]
    ParseError {
        #[source]
        source: serde_json::Error,
    },

    /// トークン取得時のストレージエラー
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTPステータスコード（あれば）
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::RequestError { source } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// 401/403 またはそれに相当する失敗かどうか
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403)) || matches!(self, ApiError::MissingToken)
    }

    /// ステータスを持たない通信失敗（再試行対象）
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ApiError::RequestError { source } if source.status().is_none())
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_authentication_failure() {
            ErrorClass::AuthenticationFailure
        } else if let ApiError::Store(_) = self {
            ErrorClass::StorageFailure
        } else {
            ErrorClass::NetworkFailure
        }
    }
}

/// 入力検証エラー（フィールド名 -> メッセージ）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同じフィールドは最初のメッセージを残す
    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", joined)
    }
}

/// ログイン関連エラー
#[derive(Error, Debug)]
pub enum LoginError {
    /// 入力検証エラー
    #[error("Invalid input: {0}")]
    Validation(ValidationErrors),

    /// ログインAPIエラー
    #[error("{0}")]
    Api(#[from] ApiError),

    /// セッション保存エラー
    #[error("Failed to store session: {0}")]
    Storage(#[from] StoreError),
}

impl LoginError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LoginError::Validation(_) => ErrorClass::Validation,
            LoginError::Api(e) => e.class(),
            LoginError::Storage(e) => e.class(),
        }
    }
}

/// 設定関連エラー
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 設定ファイル読み込みエラー
    #[error("Failed to load config file: {source}")]
    LoadError {
        #[source]
        source: std::io::Error,
    },

    /// 設定ファイルパースエラー
    #[error("Failed to parse config file: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    /// 設定ファイルシリアライズエラー
    #[error("Failed to serialize config: {source}")]
    SerializeError {
        #[source]
        source: toml::ser::Error,
    },

    /// 設定ファイル書き込みエラー
    #[error("Failed to write config file: {source}")]
    WriteError {
        #[source]
        source: std::io::Error,
    },
}

impl From<keyring::Error> for StoreError {
    fn from(error: keyring::Error) -> Self {
        StoreError::KeyringError { source: error }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::IoError { source: error }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::JsonError { source: error }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::RequestError { source: error }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::ParseError { source: error }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(error: url::ParseError) -> Self {
        ApiError::InvalidUrl { source: error }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::LoadError { source: error }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::ParseError { source: error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_401_and_403_are_authentication_failures() {
        for status in [401, 403] {
            let err = ApiError::Status {
                status,
                message: "denied".to_string(),
            };
            assert!(err.is_authentication_failure());
            assert_eq!(err.class(), ErrorClass::AuthenticationFailure);
        }
    }

    #[test]
    fn test_other_statuses_are_network_failures() {
        let err = ApiError::Status {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!err.is_authentication_failure());
        assert!(!err.is_transport_failure());
        assert_eq!(err.class(), ErrorClass::NetworkFailure);
    }

    #[test]
    fn test_missing_token_counts_as_authentication_failure() {
        assert!(ApiError::MissingToken.is_authentication_failure());
    }

    #[test]
    fn test_store_error_class() {
        let err = StoreError::Unavailable {
            reason: "locked".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::StorageFailure);
        assert_eq!(AppError::from(err).class(), ErrorClass::StorageFailure);
    }

    #[test]
    fn test_validation_errors_keep_first_message_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "Invalid email address");
        errors.add("email", "second");
        errors.add("password", "too short");

        assert_eq!(errors.get("email"), Some("Invalid email address"));
        assert_eq!(
            errors.to_string(),
            "email: Invalid email address, password: too short"
        );
        assert_eq!(
            LoginError::Validation(errors).class(),
            ErrorClass::Validation
        );
    }
}
