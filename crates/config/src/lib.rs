//! Configuration loading and validation.
//!
//! Values are layered with `figment`, later layers winning:
//! 1. built-in defaults,
//! 2. a config file (TOML, YAML or JSON, picked by extension),
//! 3. `FCHANGE_` environment variables, sections separated by `__`
//!    (`FCHANGE_DATABASE__URL`, `FCHANGE_INGEST__COMMIT_EVERY`).
//!
//! ```toml
//! [database]
//! backend = "postgres"
//! url = "postgres://fchange@localhost/fchange"
//! table_prefix = "fc_"
//!
//! [ingest]
//! commit_every = 25
//! ignore_ext = [".tmp", ".part"]
//!
//! [s3]
//! region = "us-west-004"
//! endpoint = "https://s3.us-west-004.backblazeb2.com"
//! key_id = "..."
//! key_secret = "..."
//! ```

mod database;
pub mod error;
mod sections;

pub use crate::database::{BackendKind, DatabaseConfig};
pub use crate::sections::{
    DEFAULT_COMMIT_EVERY, DEFAULT_MIN_DUPLICATE_SIZE, IngestConfig, ReportsConfig, S3Config,
};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use fchange_source::SourceOptions;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FCHANGE_";
const CONFIG_FILE: &str = "config.toml";

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "fchange")
}

/// `config.toml` in the user's configuration directory
/// (`~/.config/fchange/config.toml` on Linux).
pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub reports: ReportsConfig,
    pub s3: Option<S3Config>,
}
impl Config {
    /// Load from `path`, or from [`default_path()`] when that file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_path().filter(|path| path.is_file()),
        };
        tracing::debug!(path = ?path, "loading configuration");
        Self::from_figment(&Self::figment(path.as_deref())?)
    }

    /// Defaults, then the file at `path` (which must exist), then the
    /// environment.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                exn::bail!(ErrorKind::Missing(path.to_path_buf()));
            }
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
                Some("json") => figment.merge(Json::file_exact(path)),
                _ => exn::bail!(ErrorKind::Format(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.ingest.validate()?;
        if let Some(s3) = &self.s3 {
            s3.validate()?;
        }
        Ok(())
    }

    /// Options for opening any registered root.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            archives: self.ingest.archive_options(),
            #[cfg(feature = "s3")]
            s3: self.s3.as_ref().map(S3Config::credentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn with_toml(toml: &str) -> Result<Config> {
        Config::from_figment(&Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.database.backend, BackendKind::Sqlite);
        assert_eq!(config.database.table_prefix, "");
        assert_eq!(config.ingest.commit_every, DEFAULT_COMMIT_EVERY);
        assert!(config.ingest.expand_archives);
        assert_eq!(config.ingest.archive_skip_ext, [".jar"]);
        assert_eq!(config.reports.min_duplicate_size, 1024 * 1024);
        assert!(config.s3.is_none());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = with_toml(
            r#"
            [database]
            backend = "postgres"
            url = "postgres://localhost/fchange"

            [ingest]
            ignore_ext = [".tmp"]
            "#,
        )
        .unwrap();
        assert_eq!(config.database.backend, BackendKind::Postgres);
        assert_eq!(config.ingest.ignore_ext, [".tmp"]);
        assert_eq!(config.ingest.commit_every, DEFAULT_COMMIT_EVERY);
        assert_eq!(config.reports, ReportsConfig::default());
    }

    #[rstest]
    #[case::zero_commit("[ingest]\ncommit_every = 0", "ingest.commit_every")]
    #[case::bad_prefix("[database]\ntable_prefix = \"a-b\"", "database.table_prefix")]
    #[case::postgres_without_url("[database]\nbackend = \"postgres\"", "database.url")]
    #[case::empty_s3_region("[s3]\nregion = \"\"\nkey_id = \"a\"\nkey_secret = \"b\"", "s3.region")]
    fn test_invalid(#[case] toml: &str, #[case] field: &str) {
        let err = with_toml(toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(f) if f == field), "{err:?}");
    }

    #[test]
    fn test_unknown_backend_fails_to_load() {
        let err = with_toml("[database]\nbackend = \"mysql\"").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[rstest]
    #[case("config.toml", "[reports]\nmin_duplicate_size = 10\n")]
    #[case("config.yaml", "reports:\n  min_duplicate_size: 10\n")]
    #[case("config.json", r#"{"reports": {"min_duplicate_size": 10}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.reports.min_duplicate_size, 10);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&temp_dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Missing(_)));
        let ini = temp_dir.path().join("config.ini");
        std::fs::write(&ini, "").unwrap();
        let err = Config::load(Some(&ini)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Format(_)));
    }

    #[test]
    fn test_source_options() {
        let config = with_toml("[ingest]\nexpand_archives = false").unwrap();
        let options = config.source_options();
        assert!(!options.archives.expand);
        #[cfg(feature = "s3")]
        assert!(options.s3.is_none());
    }
}
