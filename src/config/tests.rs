use std::io::Write;

use super::*;
use crate::cache::UnresolvedRoutePolicy;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr, "127.0.0.1:3000".parse().unwrap());
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.store.capacity.get(), 10_000);
    assert_eq!(settings.store.timeout, Duration::from_millis(250));
}

#[test]
fn cache_settings_use_correct_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let cache = &settings.cache;

    assert!(!cache.disabled);
    assert_eq!(cache.key_prefix, "gp");
    assert_eq!(cache.default_ttl, None);
    assert_eq!(cache.max_generation_regression.get(), 25);
    assert_eq!(cache.lock_ttl, Duration::from_secs(900));
    assert!(cache.invalidation_whitelist.is_empty());
    assert!(cache.user_specific);
    assert!(!cache.key_includes_query);
    assert!(!cache.cache_unresolved_routes);
    assert_eq!(cache.default_language, "en-us");
    assert_eq!(cache.max_background_rebuilds.get(), 16);
    assert_eq!(cache.max_body_bytes.get(), 1_048_576);
}

#[test]
fn zero_default_ttl_means_forever() {
    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.default_ttl, None);

    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(60);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.default_ttl, Some(Duration::from_secs(60)));
}

#[test]
fn invalid_cache_values_are_rejected() {
    let cases: [(fn(&mut RawSettings), &str); 8] = [
        (|raw| raw.cache.key_prefix = Some(String::new()), "cache.key_prefix"),
        (
            |raw| raw.cache.key_prefix = Some("bad prefix\n".into()),
            "cache.key_prefix",
        ),
        (
            |raw| raw.cache.max_generation_regression = Some(0),
            "cache.max_generation_regression",
        ),
        (|raw| raw.cache.lock_ttl_seconds = Some(0), "cache.lock_ttl_seconds"),
        (
            |raw| raw.cache.lock_ttl_seconds = Some(u64::MAX),
            "cache.lock_ttl_seconds",
        ),
        (
            |raw| raw.cache.default_ttl_seconds = Some(u64::MAX),
            "cache.default_ttl_seconds",
        ),
        (|raw| raw.store.capacity = Some(0), "store.capacity"),
        (|raw| raw.store.timeout_ms = Some(0), "store.timeout_ms"),
    ];

    for (mutate, expected) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected),
            other => panic!("expected invalid `{expected}`, got {other:?}"),
        }
    }
}

#[test]
fn whitelist_entries_are_trimmed() {
    let mut raw = RawSettings::default();
    raw.cache.invalidation_whitelist = Some(vec![
        " sessions.session ".to_string(),
        String::new(),
        "audit.entry".to_string(),
    ]);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let whitelist = &settings.cache.invalidation_whitelist;
    assert_eq!(whitelist.len(), 2);
    assert!(whitelist.contains("sessions.session"));
    assert!(whitelist.contains("audit.entry"));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.key_prefix = Some("file".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_key_prefix: Some("cli".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.key_prefix, "cli");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["genpage"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "genpage",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-disabled=true",
        "--cache-max-generation-regression",
        "5",
        "--store-capacity",
        "64",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_disabled, Some(true));
            assert_eq!(serve.overrides.cache_max_generation_regression, Some(5));
            assert_eq!(serve.overrides.store_capacity, Some(64));
        }
    }
}

#[test]
fn config_file_is_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        r#"
[server]
port = 8080

[cache]
key_prefix = "site"
default_ttl_seconds = 300
invalidation_whitelist = ["sessions.session"]
cache_unresolved_routes = true
"#
    )
    .expect("write config");

    let cli = CliArgs {
        config_file: Some(file.path().to_path_buf()),
        command: None,
    };
    let settings = load(&cli).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 8080);
    assert_eq!(settings.cache.key_prefix, "site");
    assert_eq!(settings.cache.default_ttl, Some(Duration::from_secs(300)));
    assert!(settings.cache.invalidation_whitelist.contains("sessions.session"));

    let engine = CacheConfig::from(&settings);
    assert_eq!(engine.key_prefix, "site");
    assert_eq!(engine.unresolved_routes, UnresolvedRoutePolicy::Allow);
    assert_eq!(engine.store_timeout, settings.store.timeout);
    assert!(engine.is_whitelisted("sessions.session"));
}

#[test]
fn missing_config_file_is_an_error() {
    let cli = CliArgs {
        config_file: Some("/nonexistent/genpage.toml".into()),
        command: None,
    };
    assert!(matches!(load(&cli), Err(LoadError::Build(_))));
}
