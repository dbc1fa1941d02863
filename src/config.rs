//! Run configuration: defaults, config file and environment overrides.
//!
//! The config file is a flat `key = value` file (a TOML subset): strings are
//! double-quoted, booleans are `true`/`false`, integers are bare. `#` starts a
//! comment outside of strings.
//!
//! ```text
//! email = "me@example.com"
//! password = "secret"
//! resolution = 3     # 0 is full resolution
//! thread_count = 20
//! save_metadata = true
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::download::{DEFAULT_MAX_RETRIES, DEFAULT_WORKERS, RetryPolicy};
use crate::session::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::session::{AuthError, Credentials, SessionTimeouts};

/// Directory name under the user config directory.
pub const CONFIG_DIR_NAME: &str = "book-downloader";

/// Environment variable overriding `email`.
pub const EMAIL_ENV: &str = "ARCHIVE_EMAIL";

/// Environment variable overriding `password`.
pub const PASSWORD_ENV: &str = "ARCHIVE_PASSWORD";

/// Environment variable overriding `drive_access_token`.
pub const DRIVE_TOKEN_ENV: &str = "GDRIVE_ACCESS_TOKEN";

/// Values present in a config file. Unset keys stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Image downscale factor, 0 (full) to 10.
    pub resolution: Option<u8>,
    /// Concurrent page downloads.
    pub thread_count: Option<usize>,
    /// Assemble a PDF after downloading.
    pub create_pdf: Option<bool>,
    /// Write `metadata.json` next to the pages.
    pub save_metadata: Option<bool>,
    /// Upload the PDF to Google Drive.
    pub upload_to_drive: Option<bool>,
    /// Where book directories and PDFs are written.
    pub output_dir: Option<PathBuf>,
    /// Requests per page before giving up.
    pub max_retries: Option<u32>,
    /// Account email.
    pub email: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// OAuth access token for Google Drive.
    pub drive_access_token: Option<String>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Names the first offending key and its accepted range.
    pub fn validate(&self) -> Result<()> {
        if let Some(resolution) = self.resolution
            && resolution > 10
        {
            bail!("Invalid config value for `resolution`: {resolution}. Expected range: 0..=10");
        }
        if let Some(thread_count) = self.thread_count
            && !(1..=100).contains(&thread_count)
        {
            bail!(
                "Invalid config value for `thread_count`: {thread_count}. Expected range: 1..=100"
            );
        }
        if let Some(max_retries) = self.max_retries
            && !(1..=10).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Effective settings of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Image downscale factor, 0 (full) to 10.
    pub resolution: u8,
    /// Concurrent page downloads.
    pub thread_count: usize,
    /// Assemble a PDF after downloading.
    pub create_pdf: bool,
    /// Write `metadata.json` next to the pages.
    pub save_metadata: bool,
    /// Upload the PDF to Google Drive.
    pub upload_to_drive: bool,
    /// Where book directories and PDFs are written.
    pub output_dir: PathBuf,
    /// Requests per page before giving up.
    pub max_retries: u32,
    /// Account email.
    pub email: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// OAuth access token for Google Drive.
    pub drive_access_token: Option<String>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP request timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: 0,
            thread_count: DEFAULT_WORKERS,
            create_pdf: true,
            save_metadata: false,
            upload_to_drive: false,
            output_dir: PathBuf::from("."),
            max_retries: DEFAULT_MAX_RETRIES,
            email: None,
            password: None,
            drive_access_token: None,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("resolution", &self.resolution)
            .field("thread_count", &self.thread_count)
            .field("create_pdf", &self.create_pdf)
            .field("save_metadata", &self.save_metadata)
            .field("upload_to_drive", &self.upload_to_drive)
            .field("output_dir", &self.output_dir)
            .field("max_retries", &self.max_retries)
            .field("email", &self.email)
            .field("password", &redacted(&self.password))
            .field("drive_access_token", &redacted(&self.drive_access_token))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Applies the keys set in `file` on top of the defaults.
    #[must_use]
    pub fn from_file_config(file: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            resolution: file.resolution.unwrap_or(defaults.resolution),
            thread_count: file.thread_count.unwrap_or(defaults.thread_count),
            create_pdf: file.create_pdf.unwrap_or(defaults.create_pdf),
            save_metadata: file.save_metadata.unwrap_or(defaults.save_metadata),
            upload_to_drive: file.upload_to_drive.unwrap_or(defaults.upload_to_drive),
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
            email: file.email,
            password: file.password,
            drive_access_token: file.drive_access_token,
            connect_timeout_secs: file
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(defaults.read_timeout_secs),
        }
    }

    /// Overrides secrets from the environment; set, non-empty variables win
    /// over the config file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(email) = non_empty(EMAIL_ENV) {
            self.email = Some(email);
        }
        if let Some(password) = non_empty(PASSWORD_ENV) {
            self.password = Some(password);
        }
        if let Some(token) = non_empty(DRIVE_TOKEN_ENV) {
            self.drive_access_token = Some(token);
        }
    }

    /// Login credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] if email or password is unset.
    pub fn credentials(&self) -> Result<Credentials, AuthError> {
        match (&self.email, &self.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Ok(Credentials::new(email.clone(), password.clone()))
            }
            _ => Err(AuthError::MissingCredentials),
        }
    }

    /// HTTP timeouts for the session.
    #[must_use]
    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            connect_secs: self.connect_timeout_secs,
            read_secs: self.read_timeout_secs,
        }
    }

    /// Page retry policy with the configured attempt cap.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries)
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path that was consulted, if any.
    pub path: Option<PathBuf>,
    /// Effective configuration.
    pub config: Config,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/book-downloader/config.toml`
/// 2. `$HOME/.config/book-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the run configuration and applies environment overrides.
///
/// An `explicit` path must exist; the default path is optional and defaults
/// are used when it is absent.
///
/// # Errors
///
/// Fails when the file cannot be read, has a syntax error, an unknown key or
/// an out-of-range value.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let (path, required) = match explicit {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (resolve_default_config_path(), false),
    };

    let file = match path.as_deref() {
        Some(path_ref) if required || path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    let loaded_from_file = file.is_some();

    let mut config = Config::from_file_config(file.unwrap_or_default());
    config.apply_env_overrides(|name| env::var(name).ok());

    Ok(LoadedConfig {
        path,
        config,
        loaded_from_file,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Parses config file contents.
///
/// # Errors
///
/// Fails on syntax errors, unknown keys and invalid values.
pub fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_number = line_index + 1;
        let context = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "resolution" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.resolution = Some(
                    u8::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("resolution out of range for u8"))
                        .with_context(context)?,
                );
            }
            "thread_count" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.thread_count = Some(
                    usize::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("thread_count out of range"))
                        .with_context(context)?,
                );
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.max_retries = Some(
                    u32::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("max_retries out of range for u32"))
                        .with_context(context)?,
                );
            }
            "create_pdf" => cfg.create_pdf = Some(parse_boolean(value).with_context(context)?),
            "save_metadata" => {
                cfg.save_metadata = Some(parse_boolean(value).with_context(context)?);
            }
            "upload_to_drive" => {
                cfg.upload_to_drive = Some(parse_boolean(value).with_context(context)?);
            }
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "email" => cfg.email = Some(parse_string_literal(value).with_context(context)?),
            "password" => cfg.password = Some(parse_string_literal(value).with_context(context)?),
            "drive_access_token" => {
                cfg.drive_access_token = Some(parse_string_literal(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
