use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.database.url, None);
    assert_eq!(settings.jobs.environment, "development");
    assert_eq!(settings.jobs.generate.concurrency.get(), 5);
    assert_eq!(settings.jobs.publish.concurrency.get(), 1);
    assert_eq!(settings.jobs.max_attempts, 5);
    assert_eq!(settings.scheduler.cadence, Duration::from_secs(60));
    assert_eq!(settings.publish.policy, PublishPolicy::BestEffort);
    assert_eq!(settings.publish.branch_naming, BranchNaming::Timestamped);
    assert_eq!(
        settings.publish.github_api_url.as_str(),
        "https://api.github.com/"
    );
    assert_eq!(settings.generator.api_key, None);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.jobs.publish_concurrency = Some(2);
    raw.logging.level = Some("info".to_string());

    let overrides = WorkOverrides {
        publish_concurrency: Some(4),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_work_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.jobs.publish.concurrency.get(), 4);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = WorkOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_work_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn policy_and_branch_naming_parse() {
    let mut raw = RawSettings::default();
    raw.publish.policy = Some("all_must_succeed".to_string());
    raw.publish.branch_naming = Some("stable".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.publish.policy, PublishPolicy::AllMustSucceed);
    assert_eq!(settings.publish.branch_naming, BranchNaming::Stable);
}

#[test]
fn unknown_policy_is_rejected() {
    let mut raw = RawSettings::default();
    raw.publish.policy = Some("most".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid policy");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "publish.policy",
            ..
        }
    ));
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.generate_concurrency = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero concurrency");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.generate_concurrency",
            ..
        }
    ));
}

#[test]
fn max_attempts_is_bounded() {
    let mut raw = RawSettings::default();
    raw.jobs.max_attempts = Some(0);
    assert!(Settings::from_raw(raw.clone()).is_err());

    raw.jobs.max_attempts = Some(MAX_ATTEMPTS_CEILING + 1);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn blank_values_fall_back_to_defaults() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    raw.generator.api_key = Some(String::new());
    raw.jobs.environment = Some(" production ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.database.url, None);
    assert_eq!(settings.generator.api_key, None);
    assert_eq!(settings.jobs.environment, "production");
}

#[test]
fn environment_with_spaces_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.environment = Some("prod east".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn command_is_optional() {
    let args = CliArgs::parse_from(["pressroom"]);
    assert!(args.command.is_none());
}

#[test]
fn parse_work_overrides() {
    let args = CliArgs::parse_from([
        "pressroom",
        "work",
        "--jobs-generate-concurrency",
        "3",
        "--publish-policy",
        "any_must_succeed",
        "--database-url",
        "postgres://override",
    ]);

    match args.command.expect("work command") {
        Command::Work(work) => {
            assert_eq!(work.overrides.generate_concurrency, Some(3));
            assert_eq!(
                work.overrides.publish_policy.as_deref(),
                Some("any_must_succeed")
            );
            assert_eq!(
                work.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_enqueue_arguments() {
    let args = CliArgs::parse_from([
        "pressroom",
        "enqueue-publish",
        "--database-url",
        "postgres://example",
        "42",
    ]);

    match args.command.expect("enqueue command") {
        Command::EnqueuePublish(enqueue) => {
            assert_eq!(enqueue.article_id, 42);
            assert_eq!(
                enqueue.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from(["pressroom", "migrate"]);
    assert!(matches!(args.command, Some(Command::Migrate(_))));
}
