//! Configuration loading, layering and validation tests
//!
//! Tests that touch process environment variables are marked #[serial]
//! so they never run in parallel with each other.

use cvmatch_common::config::{
    default_config_path, write_toml_config, AppConfig, CliOverrides, LoggingConfig, Requirements, ENV_COMICVINE_API_KEY,
    ENV_WORKERS,
};
use serial_test::serial;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_defaults() {
    let config = AppConfig::default();

    assert_eq!(config.worker_count, 3);
    assert_eq!(config.anthropic_model, "claude-3-5-sonnet-20240620");
    assert_eq!(config.anthropic_max_tokens, 1024);
    assert_eq!(config.comicvine_base_url, "https://comicvine.gamespot.com/api");
    assert_eq!(config.issue_cache_ttl(), Duration::from_secs(86_400));
    assert_eq!(config.max_volumes_to_check, 5);
    assert_eq!(config.logging.level, "info");
    assert!(config.comicvine_api_key.is_none());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = AppConfig::from_toml_str(
        r#"
        comicvine_api_key = "cv-key"
        worker_count = 8

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.comicvine_api_key.as_deref(), Some("cv-key"));
    assert_eq!(config.worker_count, 8);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.retry_attempts, 3);
    assert_eq!(config.catalog_min_interval_ms, 1000);
}

#[test]
fn test_invalid_toml_is_an_error() {
    assert!(AppConfig::from_toml_str("worker_count = \"many\"").is_err());
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    assert!(AppConfig::load_file(Some(&missing)).is_err());
}

#[test]
fn test_env_overrides_toml() {
    let mut config = AppConfig::from_toml_str("comicvine_api_key = \"from-toml\"").unwrap();
    config.apply_env_from(env_of(&[
        (ENV_COMICVINE_API_KEY, "from-env"),
        (ENV_WORKERS, "6"),
    ]));

    assert_eq!(config.comicvine_api_key.as_deref(), Some("from-env"));
    assert_eq!(config.worker_count, 6);
}

#[test]
fn test_blank_env_key_does_not_override() {
    let mut config = AppConfig::from_toml_str("comicvine_api_key = \"from-toml\"").unwrap();
    config.apply_env_from(env_of(&[(ENV_COMICVINE_API_KEY, "   ")]));

    assert_eq!(config.comicvine_api_key.as_deref(), Some("from-toml"));
}

#[test]
fn test_invalid_worker_env_is_ignored() {
    let mut config = AppConfig::default();
    config.apply_env_from(env_of(&[(ENV_WORKERS, "zero")]));
    assert_eq!(config.worker_count, 3);

    config.apply_env_from(env_of(&[(ENV_WORKERS, "0")]));
    assert_eq!(config.worker_count, 3);
}

#[test]
fn test_cli_overrides_env() {
    let mut config = AppConfig::default();
    config.apply_env_from(env_of(&[(ENV_COMICVINE_API_KEY, "from-env")]));
    config.apply_cli(&CliOverrides {
        comicvine_api_key: Some("from-cli".to_string()),
        worker_count: Some(2),
        database_path: Some(PathBuf::from("/tmp/cli.db")),
        ..Default::default()
    });

    assert_eq!(config.comicvine_api_key.as_deref(), Some("from-cli"));
    assert_eq!(config.worker_count, 2);
    assert_eq!(config.database_path(), PathBuf::from("/tmp/cli.db"));
}

#[test]
#[serial]
fn test_resolve_reads_process_environment() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "worker_count = 4\n").unwrap();

    std::env::set_var(ENV_WORKERS, "7");
    let config = AppConfig::resolve(Some(&path), &CliOverrides::default()).unwrap();
    std::env::remove_var(ENV_WORKERS);

    assert_eq!(config.worker_count, 7);
}

#[test]
#[serial]
fn test_resolve_without_env_uses_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "worker_count = 4\n").unwrap();

    std::env::remove_var(ENV_WORKERS);
    let config = AppConfig::resolve(Some(&path), &CliOverrides::default()).unwrap();

    assert_eq!(config.worker_count, 4);
}

/// Point the platform config directory at `dir` for the duration of `f`
#[cfg(target_os = "linux")]
fn with_config_home<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir);
    std::env::remove_var(ENV_WORKERS);
    let out = f();
    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    out
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_resolve_without_default_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let (path, resolved) = with_config_home(temp_dir.path(), || {
        (default_config_path(), AppConfig::resolve(None, &CliOverrides::default()))
    });

    assert_eq!(path, Some(temp_dir.path().join("cvmatch").join("config.toml")));
    assert!(!temp_dir.path().join("cvmatch").exists());
    assert_eq!(resolved.unwrap().worker_count, 3);
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_resolve_reads_file_at_default_location() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("cvmatch");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "worker_count = 5\n").unwrap();

    let config = with_config_home(temp_dir.path(), || {
        AppConfig::resolve(None, &CliOverrides::default())
    })
    .unwrap();

    assert_eq!(config.worker_count, 5);
}

#[test]
fn test_validate_requires_catalog_key() {
    let config = AppConfig::default();
    let needs_catalog = Requirements {
        catalog: true,
        completion: false,
    };

    let err = config.validate(needs_catalog).unwrap_err();
    assert!(err.to_string().contains("Catalog API key not configured"));

    // parse-only runs need nothing
    assert!(config.validate(Requirements::default()).is_ok());
}

#[test]
fn test_validate_requires_completion_key_when_requested() {
    let config = AppConfig {
        comicvine_api_key: Some("cv".to_string()),
        ..Default::default()
    };

    assert!(config
        .validate(Requirements {
            catalog: true,
            completion: true
        })
        .is_err());
    assert!(config
        .validate(Requirements {
            catalog: true,
            completion: false
        })
        .is_ok());
}

#[test]
fn test_validate_rejects_zero_workers() {
    let config = AppConfig {
        worker_count: 0,
        ..Default::default()
    };
    assert!(config.validate(Requirements::default()).is_err());
}

#[test]
fn test_completion_interval_from_rate_limit() {
    let config = AppConfig {
        completion_rate_limit_per_min: 30,
        ..Default::default()
    };
    assert_eq!(config.completion_min_interval(), Duration::from_secs(2));

    let unlimited = AppConfig {
        completion_rate_limit_per_min: 0,
        ..Default::default()
    };
    assert_eq!(unlimited.completion_min_interval(), Duration::ZERO);
}

#[test]
fn test_atomic_write_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let config = AppConfig {
        comicvine_api_key: Some("key123".to_string()),
        logging: LoggingConfig {
            level: "warn".to_string(),
            file: None,
        },
        ..Default::default()
    };

    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!target.with_extension("toml.tmp").exists());

    let loaded = AppConfig::load_file(Some(&target)).unwrap();
    assert_eq!(loaded, config);
}

#[cfg(unix)]
#[test]
fn test_written_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    write_toml_config(&AppConfig::default(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
