//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. schedule-hub.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。
//! 認証情報はファイルに直接書かず、この展開で注入してください。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;
use crate::recurrence::DEFAULT_RANGE_MONTHS;
use crate::timex::RelativeDatePolicy;

/// Default config file name
pub const CONFIG_FILE: &str = "schedule-hub.toml";

/// NLU provider type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NluProviderKind {
    /// OpenAI / Azure OpenAI chat completions
    #[default]
    OpenAi,
    /// Azure Conversational Language Understanding
    Clu,
    /// LUIS v3 prediction endpoint
    Luis,
}

impl NluProviderKind {
    /// 文字列からプロバイダー種別へ変換（不明な値は OpenAI）
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "clu" | "conversation" => Self::Clu,
            "luis" => Self::Luis,
            _ => Self::OpenAi,
        }
    }
}

/// NLU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    #[serde(default)]
    pub provider: NluProviderKind,

    /// API key (subscription key for CLU / LUIS)
    #[serde(default)]
    pub api_key: String,

    /// Model name (OpenAI only)
    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint base URL. Azure endpoints switch the OpenAI client to
    /// deployment-based URLs.
    pub endpoint: Option<String>,

    /// Azure OpenAI deployment or CLU deployment name
    pub deployment: Option<String>,

    pub api_version: Option<String>,

    /// CLU project name
    pub project_name: Option<String>,

    /// LUIS application id
    pub app_id: Option<String>,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            provider: NluProviderKind::default(),
            api_key: String::new(),
            model: default_model(),
            endpoint: None,
            deployment: None,
            api_version: None,
            project_name: None,
            app_id: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// CalDAV calendar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// CalDAV server base URL
    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Calendar collection path; `{user}` is replaced by the user id
    #[serde(default = "default_calendar_path")]
    pub calendar_path: String,

    /// IANA time zone for event times; floating times if unset
    pub time_zone: Option<String>,

    /// Domain for attendee names that are not e-mail addresses
    #[serde(default = "default_attendee_domain")]
    pub attendee_domain: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            password: String::new(),
            calendar_path: default_calendar_path(),
            time_zone: None,
            attendee_domain: default_attendee_domain(),
        }
    }
}

fn default_calendar_path() -> String {
    "calendars/{user}/default".to_string()
}

fn default_attendee_domain() -> String {
    "example.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins (e.g., ["http://localhost:3000", "https://example.com"])
    /// If empty, defaults to localhost only
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

/// Date resolution and recurrence defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Days added to "now" for relative or unparseable dates
    #[serde(default = "default_relative_day_offset")]
    pub relative_day_offset: i64,

    /// Months a recurring series stays active
    #[serde(default = "default_recurrence_range_months")]
    pub recurrence_range_months: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            relative_day_offset: default_relative_day_offset(),
            recurrence_range_months: default_recurrence_range_months(),
        }
    }
}

impl ResolverConfig {
    pub fn relative_date_policy(&self) -> RelativeDatePolicy {
        RelativeDatePolicy::new(self.relative_day_offset)
    }
}

fn default_relative_day_offset() -> i64 {
    1
}

fn default_recurrence_range_months() -> u32 {
    DEFAULT_RANGE_MONTHS
}

/// Main configuration for schedule-hub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nlu: NluConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next(); // '{' を消費

            let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            if let Ok(env_value) = std::env::var(&var_name) {
                result.push_str(&env_value);
            }
        }

        result
    }

    /// TOML 文字列から設定を読み込む（環境変数による上書きなし）
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// # 引数
    /// * `path` - TOML ファイルのパス
    ///
    /// # 環境変数展開
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;

        // 既存の環境変数で上書き（環境変数が優先）
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./schedule-hub.toml` があればそれを使い、
    /// 見つからない場合は環境変数のみから読み込みます。
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        if env_value("NLU_API_KEY").is_none() {
            return Err(Error::Config("NLU_API_KEY not set".to_string()));
        }

        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// 環境変数で設定を上書きする（空の値は無視）
    fn apply_env_overrides(&mut self) {
        // NLU 設定の上書き
        if let Some(provider) = env_value("NLU_PROVIDER") {
            self.nlu.provider = NluProviderKind::parse(&provider);
        }
        if let Some(key) = env_value("NLU_API_KEY") {
            self.nlu.api_key = key;
        }
        if let Some(model) = env_value("NLU_MODEL") {
            self.nlu.model = model;
        }
        override_opt(&mut self.nlu.endpoint, "NLU_ENDPOINT");
        override_opt(&mut self.nlu.deployment, "NLU_DEPLOYMENT");
        override_opt(&mut self.nlu.api_version, "NLU_API_VERSION");
        override_opt(&mut self.nlu.project_name, "NLU_PROJECT_NAME");
        override_opt(&mut self.nlu.app_id, "NLU_APP_ID");

        // カレンダー設定の上書き
        if let Some(url) = env_value("CALDAV_URL") {
            self.calendar.server_url = url;
        }
        if let Some(username) = env_value("CALDAV_USERNAME") {
            self.calendar.username = username;
        }
        if let Some(password) = env_value("CALDAV_PASSWORD") {
            self.calendar.password = password;
        }
        if let Some(path) = env_value("CALDAV_CALENDAR_PATH") {
            self.calendar.calendar_path = path;
        }
        override_opt(&mut self.calendar.time_zone, "CALENDAR_TIME_ZONE");
        if let Some(domain) = env_value("ATTENDEE_DOMAIN") {
            self.calendar.attendee_domain = domain;
        }

        // API 設定の上書き
        if let Some(port) = env_value("API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(origins) = env_value("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        // 日付解決設定の上書き
        if let Some(offset) = env_value("RELATIVE_DAY_OFFSET").and_then(|v| v.parse().ok()) {
            self.resolver.relative_day_offset = offset;
        }
        if let Some(months) = env_value("RECURRENCE_RANGE_MONTHS").and_then(|v| v.parse().ok()) {
            self.resolver.recurrence_range_months = months;
        }
    }

    /// 起動前の検証（必須項目の確認）
    pub fn validate(&self) -> crate::Result<()> {
        if self.nlu.api_key.trim().is_empty() {
            return Err(Error::Config("nlu.api_key is required".to_string()));
        }
        match self.nlu.provider {
            NluProviderKind::Clu => {
                if self.nlu.endpoint.is_none() || self.nlu.project_name.is_none() {
                    return Err(Error::Config(
                        "CLU requires nlu.endpoint and nlu.project_name".to_string(),
                    ));
                }
            }
            NluProviderKind::Luis => {
                if self.nlu.endpoint.is_none() || self.nlu.app_id.is_none() {
                    return Err(Error::Config(
                        "LUIS requires nlu.endpoint and nlu.app_id".to_string(),
                    ));
                }
            }
            NluProviderKind::OpenAi => {}
        }
        if self.calendar.server_url.trim().is_empty() {
            return Err(Error::Config("calendar.server_url is required".to_string()));
        }
        Ok(())
    }
}

/// 空でない環境変数の値
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn override_opt(target: &mut Option<String>, name: &str) {
    if let Some(value) = env_value(name) {
        *target = Some(value);
    }
}
