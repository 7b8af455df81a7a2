use crate::error::{Result, RistobotError};
use ini::{Ini, ParseOption};
use std::path::{Path, PathBuf};

/// INI section holding the cluster endpoint and credentials.
pub const DEFAULT_SECTION: &str = "milvus_ristobot";

/// Overrides the `uri` key when set.
pub const URI_ENV: &str = "MILVUS_URI";
/// Overrides the `token` key when set.
pub const TOKEN_ENV: &str = "MILVUS_TOKEN";

/// Connection settings read from `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub uri: String,
    pub token: String,
    pub section: String,
    pub source: Option<PathBuf>,
}

/// Values are taken verbatim: tokens may contain backslashes and quotes.
fn raw_values() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        enabled_quote: false,
        ..ParseOption::default()
    }
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            token: token.into(),
            section: DEFAULT_SECTION.to_string(),
            source: None,
        }
    }

    /// Read `uri` and `token` from `section` of the INI file at `path`.
    pub fn load(path: impl AsRef<Path>, section: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RistobotError::Config(format!(
                "{} not found",
                path.display()
            )));
        }

        let ini = Ini::load_from_file_opt(path, raw_values()).map_err(|e| {
            RistobotError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_ini(&ini, section)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse INI text directly. Used by `load` and by callers that embed the file.
    pub fn from_ini_str(contents: &str, section: &str) -> Result<Self> {
        let ini = Ini::load_from_str_opt(contents, raw_values())
            .map_err(|e| RistobotError::Config(format!("failed to parse config: {}", e)))?;
        Self::from_ini(&ini, section)
    }

    fn from_ini(ini: &Ini, section: &str) -> Result<Self> {
        let props = ini.section(Some(section)).ok_or_else(|| {
            RistobotError::Config(format!("section [{}] is missing", section))
        })?;

        let get = |key: &str| -> Result<String> {
            props
                .get(key)
                .map(|v| v.trim().to_string())
                .ok_or_else(|| {
                    RistobotError::Config(format!("key `{}` is missing in [{}]", key, section))
                })
        };

        Ok(Self {
            uri: get("uri")?,
            token: get("token")?,
            section: section.to_string(),
            source: None,
        })
    }

    /// Apply `MILVUS_URI` / `MILVUS_TOKEN` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(std::env::var(URI_ENV).ok(), std::env::var(TOKEN_ENV).ok())
    }

    pub fn with_overrides(mut self, uri: Option<String>, token: Option<String>) -> Self {
        if let Some(uri) = uri.filter(|u| !u.trim().is_empty()) {
            self.uri = uri;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = token;
        }
        self
    }

    /// Token with everything but the first and last two characters hidden.
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() <= 6 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
[milvus_ristobot]
uri = https://in03-abc.api.gcp-us-west1.zillizcloud.com
token = db_admin:s3cretpassword

[example]
uri = http://localhost:19530
token = root:Milvus
";

    #[test]
    fn test_load_named_section() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ConnectionConfig::load(file.path(), DEFAULT_SECTION).unwrap();
        assert_eq!(config.uri, "https://in03-abc.api.gcp-us-west1.zillizcloud.com");
        assert_eq!(config.token, "db_admin:s3cretpassword");
        assert_eq!(config.section, DEFAULT_SECTION);
        assert_eq!(config.source.as_deref(), Some(file.path()));

        let other = ConnectionConfig::load(file.path(), "example").unwrap();
        assert_eq!(other.uri, "http://localhost:19530");
    }

    #[test]
    fn test_missing_file() {
        let err = ConnectionConfig::load("/definitely/not/here/config.ini", DEFAULT_SECTION)
            .unwrap_err();
        assert!(matches!(err, RistobotError::Config(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_missing_section() {
        let err = ConnectionConfig::from_ini_str("[other]\nuri = x\ntoken = y\n", DEFAULT_SECTION)
            .unwrap_err();
        assert!(err.to_string().contains("[milvus_ristobot]"));
    }

    #[test]
    fn test_missing_key() {
        let err = ConnectionConfig::from_ini_str(
            "[milvus_ristobot]\nuri = http://localhost:19530\n",
            DEFAULT_SECTION,
        )
        .unwrap_err();
        assert!(err.to_string().contains("`token`"));
    }

    #[test]
    fn test_token_is_read_verbatim() {
        let config = ConnectionConfig::from_ini_str(
            "[milvus_ristobot]\nuri = http://localhost:19530\ntoken = db_admin:p\\a\"ss\n",
            DEFAULT_SECTION,
        )
        .unwrap();
        assert_eq!(config.token, "db_admin:p\\a\"ss");
    }

    #[test]
    fn test_file_token_is_read_verbatim() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[milvus_ristobot]\nuri = http://localhost:19530\n")
            .unwrap();
        file.write_all(b"token = \"root:Mil\\vus\"\n").unwrap();

        let config = ConnectionConfig::load(file.path(), DEFAULT_SECTION).unwrap();
        assert_eq!(config.token, "\"root:Mil\\vus\"");
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let config = ConnectionConfig::new("http://a", "t1")
            .with_overrides(Some("http://b".into()), Some("  ".into()));
        assert_eq!(config.uri, "http://b");
        assert_eq!(config.token, "t1");
    }

    #[test]
    fn test_masked_token() {
        let config = ConnectionConfig::new("http://a", "root:Milvus");
        assert_eq!(config.masked_token(), "ro*******us");
        assert_eq!(ConnectionConfig::new("http://a", "abc").masked_token(), "***");
    }
}
