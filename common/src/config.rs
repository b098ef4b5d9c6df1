use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub aws: Option<AwsConfig>,
    #[serde(default)]
    pub transform: TransformConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Local directory, `file://` URL or `s3://bucket/prefix`.
    pub root: String,
    #[serde(default = "default_song_pattern")]
    pub song_pattern: String,
    #[serde(default = "default_log_pattern")]
    pub log_pattern: String,
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub root: String,
    #[serde(default = "default_compression")]
    pub compression: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TransformConfig {
    #[serde(default)]
    pub timezone: TimeZoneMode,
    #[serde(default)]
    pub key_policy: KeyPolicy,
    #[serde(default)]
    pub join_mode: JoinMode,
}

/// Zone used to turn epoch milliseconds into calendar fields.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeZoneMode {
    #[default]
    Utc,
    Local,
}

/// How dimension rows sharing a primary key are collapsed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// One row per key; ties resolved by a deterministic ordering.
    #[default]
    FirstWins,
    /// Only exact duplicate rows are removed. Keys may repeat.
    Exact,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Events without a catalog match are dropped from the fact table.
    #[default]
    Inner,
    /// Events without a catalog match are kept with null song/artist ids.
    Left,
}

fn default_song_pattern() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_pattern() -> String {
    "log_data/*/*/*.json".to_string()
}

fn default_read_concurrency() -> usize {
    16
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_s3_region() -> String {
    "us-west-2".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            input = %settings.input.root,
            output = %settings.output.root,
            has_credentials = settings.aws.is_some(),
            "Loaded pipeline settings"
        );

        Ok(settings)
    }

    /// Settings for a run between two local directories, everything else defaulted.
    pub fn local(input_root: impl Into<String>, output_root: impl Into<String>) -> Self {
        Self {
            input: InputConfig {
                root: input_root.into(),
                song_pattern: default_song_pattern(),
                log_pattern: default_log_pattern(),
                read_concurrency: default_read_concurrency(),
            },
            output: OutputConfig {
                root: output_root.into(),
                compression: default_compression(),
            },
            aws: None,
            transform: TransformConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                r#"
                [input]
                root = "s3://udacity-dend/"

                [output]
                root = "/tmp/lake"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.input.song_pattern, "song_data/*/*/*/*.json");
        assert_eq!(settings.input.log_pattern, "log_data/*/*/*.json");
        assert_eq!(settings.output.compression, "snappy");
        assert!(settings.aws.is_none());
        assert_eq!(settings.transform.timezone, TimeZoneMode::Utc);
        assert_eq!(settings.transform.key_policy, KeyPolicy::FirstWins);
        assert_eq!(settings.transform.join_mode, JoinMode::Inner);
    }

    #[test]
    fn test_transform_options_parse_snake_case() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                r#"
                [input]
                root = "in"

                [output]
                root = "out"

                [aws]
                access_key = "AKIA"
                secret_key = "secret"

                [transform]
                timezone = "local"
                key_policy = "exact"
                join_mode = "left"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let aws = settings.aws.unwrap();
        assert_eq!(aws.region, "us-west-2");
        assert!(!aws.allow_http);
        assert_eq!(settings.transform.timezone, TimeZoneMode::Local);
        assert_eq!(settings.transform.key_policy, KeyPolicy::Exact);
        assert_eq!(settings.transform.join_mode, JoinMode::Left);
    }
}
