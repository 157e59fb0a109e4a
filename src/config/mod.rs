//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::types::{BranchNaming, PublishPolicy};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressroom";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_GENERATE_CONCURRENCY: u32 = 5;
const DEFAULT_GENERATE_POLL_SECS: u64 = 2;
const DEFAULT_PUBLISH_CONCURRENCY: u32 = 1;
const DEFAULT_PUBLISH_POLL_SECS: u64 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const MAX_ATTEMPTS_CEILING: u32 = 100;
const DEFAULT_SCHEDULER_CADENCE_SECS: u64 = 60;
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GENERATOR_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Command-line arguments for the pressroom binary.
#[derive(Debug, Parser)]
#[command(
    name = "pressroom",
    version,
    about = "Article generation and publishing pipeline"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSROOM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the queue consumers and the publish scheduler.
    Work(Box<WorkArgs>),
    /// Queue content generation for an article.
    #[command(name = "enqueue-generate")]
    EnqueueGenerate(EnqueueArgs),
    /// Queue publishing for an article.
    #[command(name = "enqueue-publish")]
    EnqueuePublish(EnqueueArgs),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkArgs {
    #[command(flatten)]
    pub overrides: WorkOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Identifier of the article to enqueue.
    #[arg(value_name = "ARTICLE_ID")]
    pub article_id: i64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the generation worker concurrency.
    #[arg(long = "jobs-generate-concurrency", value_name = "COUNT")]
    pub generate_concurrency: Option<u32>,

    /// Override the publish worker concurrency.
    #[arg(long = "jobs-publish-concurrency", value_name = "COUNT")]
    pub publish_concurrency: Option<u32>,

    /// Override the publish scheduler cadence.
    #[arg(long = "scheduler-cadence-seconds", value_name = "SECONDS")]
    pub scheduler_cadence_seconds: Option<u64>,

    /// Override the publish policy (best_effort|any_must_succeed|all_must_succeed).
    #[arg(long = "publish-policy", value_name = "POLICY")]
    pub publish_policy: Option<String>,

    /// Override Git branch naming (timestamped|stable).
    #[arg(long = "publish-branch-naming", value_name = "MODE")]
    pub branch_naming: Option<String>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub scheduler: SchedulerSettings,
    pub publish: PublishSettings,
    pub generator: GeneratorSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub concurrency: NonZeroU32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    /// Queue namespace, e.g. `production` in `generate-article-production`.
    pub environment: String,
    pub generate: WorkerSettings,
    pub publish: WorkerSettings,
    pub max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cadence: Duration,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub policy: PublishPolicy,
    pub branch_naming: BranchNaming,
    pub github_api_url: Url,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub image_size: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PRESSROOM").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Work(args)) => raw.apply_work_overrides(&args.overrides),
        Some(Command::EnqueueGenerate(args) | Command::EnqueuePublish(args)) => {
            raw.apply_database_override(&args.database)
        }
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    scheduler: RawSchedulerSettings,
    publish: RawPublishSettings,
    generator: RawGeneratorSettings,
}

impl RawSettings {
    fn apply_work_overrides(&mut self, overrides: &WorkOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(value) = overrides.generate_concurrency {
            self.jobs.generate_concurrency = Some(value);
        }
        if let Some(value) = overrides.publish_concurrency {
            self.jobs.publish_concurrency = Some(value);
        }
        if let Some(cadence) = overrides.scheduler_cadence_seconds {
            self.scheduler.cadence_seconds = Some(cadence);
        }
        if let Some(policy) = overrides.publish_policy.as_ref() {
            self.publish.policy = Some(policy.clone());
        }
        if let Some(naming) = overrides.branch_naming.as_ref() {
            self.publish.branch_naming = Some(naming.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            jobs,
            scheduler,
            publish,
            generator,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            scheduler: build_scheduler_settings(scheduler)?,
            publish: build_publish_settings(publish)?,
            generator: build_generator_settings(generator),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let environment =
        non_blank(jobs.environment).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
    if environment.contains(char::is_whitespace) {
        return Err(LoadError::invalid(
            "jobs.environment",
            "must not contain whitespace",
        ));
    }

    let generate = WorkerSettings {
        concurrency: non_zero_u32(
            jobs.generate_concurrency
                .unwrap_or(DEFAULT_GENERATE_CONCURRENCY)
                .into(),
            "jobs.generate_concurrency",
        )?,
        poll_interval: positive_seconds(
            jobs.generate_poll_interval_seconds
                .unwrap_or(DEFAULT_GENERATE_POLL_SECS),
            "jobs.generate_poll_interval_seconds",
        )?,
    };
    let publish = WorkerSettings {
        concurrency: non_zero_u32(
            jobs.publish_concurrency
                .unwrap_or(DEFAULT_PUBLISH_CONCURRENCY)
                .into(),
            "jobs.publish_concurrency",
        )?,
        poll_interval: positive_seconds(
            jobs.publish_poll_interval_seconds
                .unwrap_or(DEFAULT_PUBLISH_POLL_SECS),
            "jobs.publish_poll_interval_seconds",
        )?,
    };

    let max_attempts = jobs.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if !(1..=MAX_ATTEMPTS_CEILING).contains(&max_attempts) {
        return Err(LoadError::invalid(
            "jobs.max_attempts",
            format!("must be between 1 and {MAX_ATTEMPTS_CEILING}"),
        ));
    }
    let max_attempts = i32::try_from(max_attempts)
        .map_err(|_| LoadError::invalid("jobs.max_attempts", "value out of range"))?;

    Ok(JobsSettings {
        environment,
        generate,
        publish,
        max_attempts,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let cadence = positive_seconds(
        scheduler
            .cadence_seconds
            .unwrap_or(DEFAULT_SCHEDULER_CADENCE_SECS),
        "scheduler.cadence_seconds",
    )?;

    Ok(SchedulerSettings { cadence })
}

fn build_publish_settings(publish: RawPublishSettings) -> Result<PublishSettings, LoadError> {
    let policy = match publish.policy.as_deref() {
        Some(value) => PublishPolicy::try_from(value.trim()).map_err(|()| {
            LoadError::invalid(
                "publish.policy",
                format!("unknown policy `{value}`; expected best_effort, any_must_succeed or all_must_succeed"),
            )
        })?,
        None => PublishPolicy::default(),
    };

    let branch_naming = match publish.branch_naming.as_deref() {
        Some(value) => BranchNaming::try_from(value.trim()).map_err(|()| {
            LoadError::invalid(
                "publish.branch_naming",
                format!("unknown mode `{value}`; expected timestamped or stable"),
            )
        })?,
        None => BranchNaming::default(),
    };

    let api_url = non_blank(publish.github_api_url)
        .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string());
    let github_api_url = Url::parse(&api_url).map_err(|err| {
        LoadError::invalid("publish.github_api_url", format!("invalid url: {err}"))
    })?;
    if github_api_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "publish.github_api_url",
            "must be an absolute http(s) url",
        ));
    }

    let http_timeout = positive_seconds(
        publish
            .http_timeout_seconds
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        "publish.http_timeout_seconds",
    )?;

    Ok(PublishSettings {
        policy,
        branch_naming,
        github_api_url,
        http_timeout,
    })
}

fn build_generator_settings(generator: RawGeneratorSettings) -> GeneratorSettings {
    GeneratorSettings {
        api_url: non_blank(generator.api_url)
            .unwrap_or_else(|| DEFAULT_GENERATOR_API_URL.to_string()),
        api_key: non_blank(generator.api_key),
        text_model: non_blank(generator.text_model)
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
        image_model: non_blank(generator.image_model)
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        image_size: non_blank(generator.image_size)
            .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string()),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    environment: Option<String>,
    generate_concurrency: Option<u32>,
    generate_poll_interval_seconds: Option<u64>,
    publish_concurrency: Option<u32>,
    publish_poll_interval_seconds: Option<u64>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    cadence_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPublishSettings {
    policy: Option<String>,
    branch_naming: Option<String>,
    github_api_url: Option<String>,
    http_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGeneratorSettings {
    api_url: Option<String>,
    api_key: Option<String>,
    text_model: Option<String>,
    image_model: Option<String>,
    image_size: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_seconds(seconds: u64, key: &'static str) -> Result<Duration, LoadError> {
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
