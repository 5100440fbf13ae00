//! Configuration management with TOML, environment variables, and CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Where per-table progress is persisted (disabled when unset)
    #[serde(default)]
    pub progress_file: Option<PathBuf>,

    /// Minimum seconds between progress saves
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Cumulative run statistics (disabled when unset)
    #[serde(default)]
    pub stats_file: Option<PathBuf>,

    /// Endpoint receiving a JSON summary after a relay run
    #[serde(default)]
    pub notify_url: Option<String>,

    /// Also write logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

fn default_progress_interval_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: OutputFormat::Table,
            progress_file: None,
            progress_interval_secs: default_progress_interval_secs(),
            stats_file: None,
            notify_url: None,
            log_file: None,
            table: TableConfig::default(),
            scrape: ScrapeConfig::default(),
            fetch: FetchConfig::default(),
            host: HostConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

/// Table service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// One entry per base; each base has its own API token
    #[serde(default)]
    pub bases: Vec<BaseConfig>,

    /// Rows requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Retries for failed API calls
    #[serde(default = "default_api_retries")]
    pub max_retries: u32,

    /// Backoff base between API retries
    #[serde(default = "default_backoff_factor_ms")]
    pub backoff_factor_ms: u64,
}

fn default_server_url() -> String {
    "https://cloud.seatable.cn".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_api_retries() -> u32 {
    3
}

fn default_backoff_factor_ms() -> u64 {
    1000
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            bases: Vec::new(),
            page_size: default_page_size(),
            max_retries: default_api_retries(),
            backoff_factor_ms: default_backoff_factor_ms(),
        }
    }
}

/// A base and the API token that grants access to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Display name; looked up from the API when missing
    #[serde(default)]
    pub name: Option<String>,
    pub token: String,
}

/// Amazon scraping behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Delay before the first page request
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// Delay before each page retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Pause between rows
    #[serde(default = "default_delay_ms")]
    pub row_delay_ms: u64,

    #[serde(default = "default_delay_jitter_ms")]
    pub row_jitter_ms: u64,

    /// Attempts per product page
    #[serde(default = "default_page_retries")]
    pub page_retries: u32,

    /// Probe candidate images before accepting them
    #[serde(default = "default_true")]
    pub verify_images: bool,

    /// Minimum short edge, in pixels, of a verified image
    #[serde(default = "default_min_image_size")]
    pub min_image_size: u32,

    /// Requested edge length when rewriting size tokens
    #[serde(default = "default_target_size")]
    pub target_size: u32,
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_delay_jitter_ms() -> u64 {
    2000
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_retry_jitter_ms() -> u64 {
    3000
}

fn default_page_retries() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_min_image_size() -> u32 {
    1000
}

fn default_target_size() -> u32 {
    1500
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            row_delay_ms: default_delay_ms(),
            row_jitter_ms: default_delay_jitter_ms(),
            page_retries: default_page_retries(),
            verify_images: true,
            min_image_size: default_min_image_size(),
            target_size: default_target_size(),
        }
    }
}

/// Where the `fetch` workflow reads links and writes images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_table")]
    pub table: String,

    #[serde(default = "default_link_column")]
    pub link_column: String,

    #[serde(default = "default_image_column")]
    pub image_column: String,

    /// How a found image is stored
    #[serde(default)]
    pub sink: SinkKind,

    /// Attempts per row update
    #[serde(default = "default_update_retries")]
    pub update_retries: u32,

    /// Pause between failed row updates
    #[serde(default = "default_update_delay_ms")]
    pub update_delay_ms: u64,

    #[serde(default = "default_update_jitter_ms")]
    pub update_jitter_ms: u64,
}

fn default_fetch_table() -> String {
    "Task".to_string()
}

fn default_link_column() -> String {
    "产品链接".to_string()
}

fn default_image_column() -> String {
    "产品图片".to_string()
}

fn default_update_retries() -> u32 {
    3
}

fn default_update_delay_ms() -> u64 {
    1000
}

fn default_update_jitter_ms() -> u64 {
    2000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            table: default_fetch_table(),
            link_column: default_link_column(),
            image_column: default_image_column(),
            sink: SinkKind::default(),
            update_retries: default_update_retries(),
            update_delay_ms: default_update_delay_ms(),
            update_jitter_ms: default_update_jitter_ms(),
        }
    }
}

/// Image host relay endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_upload_api")]
    pub upload_api: String,

    /// Largest file accepted by the host, in MiB
    #[serde(default = "default_size_limit_mb")]
    pub size_limit_mb: u64,

    /// Substring identifying URLs already on the host
    #[serde(default = "default_hosted_marker")]
    pub hosted_marker: String,

    /// Upload attempts per image
    #[serde(default = "default_api_retries")]
    pub max_retries: u32,

    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_upload_api() -> String {
    "https://img.shuang.fun/api/tgchannel".to_string()
}

fn default_size_limit_mb() -> u64 {
    5
}

fn default_hosted_marker() -> String {
    "img.shuang.fun".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    60
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            upload_api: default_upload_api(),
            size_limit_mb: default_size_limit_mb(),
            hosted_marker: default_hosted_marker(),
            max_retries: default_api_retries(),
            timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl HostConfig {
    pub fn size_limit_bytes(&self) -> u64 {
        self.size_limit_mb * 1024 * 1024
    }
}

/// Which images the `relay` workflow moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Only images served from these hosts are relayed
    #[serde(default = "default_process_domains")]
    pub process_domains: Vec<String>,

    /// Restrict the run to these tables (all tables when empty)
    #[serde(default)]
    pub tables: Vec<TableSelection>,

    /// Image columns never touched
    #[serde(default = "default_skip_columns")]
    pub skip_columns: Vec<String>,

    /// Also relay images embedded in long-text columns
    #[serde(default)]
    pub process_rich_text: bool,

    /// Pause between images
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Skip URLs whose extension is not a known image type
    #[serde(default = "default_true")]
    pub require_image_extension: bool,
}

fn default_process_domains() -> Vec<String> {
    vec!["cloud.seatable.cn".to_string(), "cloud.seatable.io".to_string()]
}

fn default_skip_columns() -> Vec<String> {
    vec![default_image_column()]
}

fn default_request_delay_ms() -> u64 {
    1000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            process_domains: default_process_domains(),
            tables: Vec::new(),
            skip_columns: default_skip_columns(),
            process_rich_text: false,
            request_delay_ms: default_request_delay_ms(),
            require_image_extension: true,
        }
    }
}

/// A table and, optionally, the only columns to process in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSelection {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("seatable-image-sync").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("SEATABLE_SERVER_URL") {
            if !url.trim().is_empty() {
                self.table.server_url = url.trim().to_string();
            }
        }

        let tokens = std::env::var("SEATABLE_API_TOKENS").or_else(|_| std::env::var("SEATABLE_API_TOKEN"));
        if let Ok(tokens) = tokens {
            let bases = parse_bases(&tokens);
            if !bases.is_empty() {
                self.table.bases = bases;
            }
        }

        if let Ok(tables) = std::env::var("SEATABLE_TABLES") {
            let selections = parse_table_selections(&tables);
            if !selections.is_empty() {
                self.relay.tables = selections;
            }
        } else if let Ok(name) = std::env::var("SEATABLE_TABLE_NAME") {
            if !name.trim().is_empty() {
                let columns = std::env::var("SEATABLE_COLUMN_NAMES").map(|c| split_list(&c, ',')).unwrap_or_default();
                self.relay.tables = vec![TableSelection { name: name.trim().to_string(), columns }];
            }
        }

        if let Ok(api) = std::env::var("IMAGE_BED_API") {
            if !api.trim().is_empty() {
                self.host.upload_api = api.trim().to_string();
            }
        }

        if let Ok(limit) = std::env::var("IMAGE_SIZE_LIMIT") {
            if let Ok(mb) = limit.trim().parse() {
                self.host.size_limit_mb = mb;
            }
        }

        if let Ok(proxy) = std::env::var("AMZ_PROXY") {
            self.scrape.proxy = Some(proxy);
        }

        if let Ok(delay) = std::env::var("AMZ_DELAY") {
            if let Ok(d) = delay.parse() {
                self.scrape.delay_ms = d;
            }
        }

        if let Ok(path) = std::env::var("PROGRESS_FILE") {
            self.progress_file = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("NOTIFY_URL") {
            self.notify_url = Some(url);
        }

        if let Ok(path) = std::env::var("LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }

        self
    }
}

/// Parses base tokens from either a JSON list of `{name, token}` objects or
/// a comma-separated list of `token` / `name:token` entries.
pub fn parse_bases(raw: &str) -> Vec<BaseConfig> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if raw.starts_with('[') {
        return match serde_json::from_str::<Vec<BaseConfig>>(raw) {
            Ok(bases) => bases.into_iter().filter(|b| !b.token.trim().is_empty()).collect(),
            Err(e) => {
                debug!("Ignoring malformed base token list: {}", e);
                Vec::new()
            }
        };
    }

    split_list(raw, ',')
        .into_iter()
        .map(|entry| match entry.split_once(':') {
            Some((name, token)) if !name.trim().is_empty() => {
                BaseConfig { name: Some(name.trim().to_string()), token: token.trim().to_string() }
            }
            Some((_, token)) => BaseConfig { name: None, token: token.trim().to_string() },
            None => BaseConfig { name: None, token: entry },
        })
        .filter(|b| !b.token.is_empty())
        .collect()
}

/// Parses `table1:col1,col2;table2` into table selections.
pub fn parse_table_selections(raw: &str) -> Vec<TableSelection> {
    split_list(raw, ';')
        .into_iter()
        .filter_map(|entry| {
            let (name, columns) = match entry.split_once(':') {
                Some((name, columns)) => (name.trim(), split_list(columns, ',')),
                None => (entry.as_str(), Vec::new()),
            };
            (!name.is_empty()).then(|| TableSelection { name: name.to_string(), columns })
        })
        .collect()
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep).map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// How the `fetch` workflow stores a found image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write the Amazon URL into the image cell
    #[default]
    Direct,
    /// Upload to the image host and write the hosted URL
    Host,
    /// Upload into the table's own asset storage
    Asset,
}

impl std::str::FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(SinkKind::Direct),
            "host" | "relay" => Ok(SinkKind::Host),
            "asset" | "upload" => Ok(SinkKind::Asset),
            _ => Err(format!("Unknown sink: {}. Use: direct, host, asset", s)),
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Direct => write!(f, "direct"),
            SinkKind::Host => write!(f, "host"),
            SinkKind::Asset => write!(f, "asset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn restore(name: &str, value: Option<String>) {
        match value {
            Some(v) => std::env::set_var(name, v),
            None => std::env::remove_var(name),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.format, OutputFormat::Table);
        assert_eq!(config.progress_interval_secs, 300);
        assert_eq!(config.table.server_url, "https://cloud.seatable.cn");
        assert_eq!(config.table.page_size, 1000);
        assert_eq!(config.scrape.page_retries, 5);
        assert_eq!(config.scrape.delay_ms, 2000);
        assert!(config.scrape.verify_images);
        assert_eq!(config.fetch.table, "Task");
        assert_eq!(config.fetch.link_column, "产品链接");
        assert_eq!(config.fetch.image_column, "产品图片");
        assert_eq!(config.fetch.sink, SinkKind::Direct);
        assert_eq!(config.host.size_limit_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.relay.process_domains, vec!["cloud.seatable.cn", "cloud.seatable.io"]);
        assert_eq!(config.relay.skip_columns, vec!["产品图片"]);
        assert!(config.notify_url.is_none());
    }

    #[test]
    fn test_empty_toml_uses_field_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.progress_interval_secs, 300);
        assert_eq!(config.scrape.target_size, 1500);
        assert_eq!(config.host.upload_api, "https://img.shuang.fun/api/tgchannel");
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);

        let err = "csv".parse::<OutputFormat>().unwrap_err();
        assert!(err.contains("Unknown format"));
        assert!(err.contains("table, json, markdown"));
    }

    #[test]
    fn test_output_format_display_and_serde() {
        assert_eq!(OutputFormat::Markdown.to_string(), "markdown");
        assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), "\"json\"");
        let parsed: OutputFormat = serde_json::from_str("\"markdown\"").unwrap();
        assert_eq!(parsed, OutputFormat::Markdown);
    }

    #[test]
    fn test_sink_kind_parsing() {
        assert_eq!("direct".parse::<SinkKind>().unwrap(), SinkKind::Direct);
        assert_eq!("Host".parse::<SinkKind>().unwrap(), SinkKind::Host);
        assert_eq!("asset".parse::<SinkKind>().unwrap(), SinkKind::Asset);
        assert!("ftp".parse::<SinkKind>().unwrap_err().contains("Unknown sink"));
        assert_eq!(SinkKind::Asset.to_string(), "asset");
    }

    #[test]
    fn test_config_from_toml_all_sections() {
        let toml = r#"
            format = "json"
            progress_file = "logs/progress.json"
            notify_url = "https://notify.example.com/hook"

            [table]
            server_url = "https://cloud.seatable.io"
            page_size = 200
            bases = [{ name = "Products", token = "abc" }, { token = "def" }]

            [scrape]
            proxy = "socks5://localhost:1080"
            page_retries = 3
            verify_images = false

            [fetch]
            table = "Listings"
            sink = "host"

            [host]
            size_limit_mb = 10
            hosted_marker = "img.example.com"

            [relay]
            process_rich_text = true
            skip_columns = []
            tables = [{ name = "Orders", columns = ["Photo"] }]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.progress_file, Some(PathBuf::from("logs/progress.json")));
        assert_eq!(config.table.server_url, "https://cloud.seatable.io");
        assert_eq!(config.table.page_size, 200);
        assert_eq!(config.table.bases.len(), 2);
        assert_eq!(config.table.bases[0].name.as_deref(), Some("Products"));
        assert_eq!(config.table.bases[1].name, None);
        assert_eq!(config.scrape.proxy.as_deref(), Some("socks5://localhost:1080"));
        assert_eq!(config.scrape.page_retries, 3);
        assert!(!config.scrape.verify_images);
        assert_eq!(config.scrape.min_image_size, 1000);
        assert_eq!(config.fetch.table, "Listings");
        assert_eq!(config.fetch.link_column, "产品链接");
        assert_eq!(config.fetch.sink, SinkKind::Host);
        assert_eq!(config.host.size_limit_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.host.hosted_marker, "img.example.com");
        assert!(config.relay.process_rich_text);
        assert!(config.relay.skip_columns.is_empty());
        assert_eq!(config.relay.tables, vec![TableSelection { name: "Orders".into(), columns: vec!["Photo".into()] }]);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [scrape]
            delay_ms = 4000
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.scrape.delay_ms, 4000);
    }

    #[test]
    fn test_config_from_file_not_found() {
        let err = Config::from_file("/nonexistent/path/config.toml").unwrap_err().to_string();
        assert!(err.contains("Failed to read config file"));
    }

    #[test]
    fn test_config_from_file_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();

        let err = Config::from_file(file.path()).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [fetch]
            image_column = "Main Image"
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.fetch.image_column, "Main Image");
    }

    #[test]
    fn test_parse_bases_plain_and_named() {
        let bases = parse_bases("tok1, Shop:tok2 ,,");
        assert_eq!(
            bases,
            vec![
                BaseConfig { name: None, token: "tok1".into() },
                BaseConfig { name: Some("Shop".into()), token: "tok2".into() },
            ]
        );
    }

    #[test]
    fn test_parse_bases_json() {
        let bases = parse_bases(r#"[{"name": "A", "token": "t1"}, {"token": "t2"}, {"token": ""}]"#);
        assert_eq!(bases.len(), 2);
        assert_eq!(bases[0].name.as_deref(), Some("A"));
        assert_eq!(bases[1].token, "t2");

        assert!(parse_bases("[not json").is_empty());
        assert!(parse_bases("   ").is_empty());
    }

    #[test]
    fn test_parse_table_selections() {
        let tables = parse_table_selections("Orders:Photo, Thumb; Products ;:x");
        assert_eq!(
            tables,
            vec![
                TableSelection { name: "Orders".into(), columns: vec!["Photo".into(), "Thumb".into()] },
                TableSelection { name: "Products".into(), columns: vec![] },
            ]
        );
    }

    #[test]
    fn test_config_with_env() {
        let names = [
            "SEATABLE_SERVER_URL",
            "SEATABLE_API_TOKENS",
            "SEATABLE_TABLES",
            "IMAGE_BED_API",
            "IMAGE_SIZE_LIMIT",
            "AMZ_PROXY",
            "AMZ_DELAY",
        ];
        let saved: Vec<_> = names.iter().map(|n| std::env::var(n).ok()).collect();

        std::env::set_var("SEATABLE_SERVER_URL", "https://cloud.seatable.io");
        std::env::set_var("SEATABLE_API_TOKENS", "Shop:abc,def");
        std::env::set_var("SEATABLE_TABLES", "Orders:Photo");
        std::env::set_var("IMAGE_BED_API", "https://img.example.com/upload");
        std::env::set_var("IMAGE_SIZE_LIMIT", "not_a_number");
        std::env::set_var("AMZ_PROXY", "http://proxy:8080");
        std::env::set_var("AMZ_DELAY", "5000");

        let config = Config::new().with_env();
        assert_eq!(config.table.server_url, "https://cloud.seatable.io");
        assert_eq!(config.table.bases.len(), 2);
        assert_eq!(config.table.bases[0].name.as_deref(), Some("Shop"));
        assert_eq!(config.relay.tables[0].name, "Orders");
        assert_eq!(config.host.upload_api, "https://img.example.com/upload");
        // Invalid values are ignored
        assert_eq!(config.host.size_limit_mb, 5);
        assert_eq!(config.scrape.proxy, Some("http://proxy:8080".to_string()));
        assert_eq!(config.scrape.delay_ms, 5000);

        for (name, value) in names.iter().zip(saved) {
            restore(name, value);
        }
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let mut config = Config::default();
        config.format = OutputFormat::Markdown;
        config.table.bases = vec![BaseConfig { name: Some("A".into()), token: "t".into() }];
        config.relay.tables = vec![TableSelection { name: "T".into(), columns: vec![] }];

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.format, OutputFormat::Markdown);
        assert_eq!(parsed.table.bases, config.table.bases);
        assert_eq!(parsed.relay.tables, config.relay.tables);
    }
}
