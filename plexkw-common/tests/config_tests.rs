//! Configuration resolution tests
//!
//! Covers the CLI → ENV → TOML → default priority order and the fatal
//! missing-token case.
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Every test that touches the process environment is marked #[serial].

use plexkw_common::config::{defaults, env_vars, LogFormat, PartialSettings, Settings};
use plexkw_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;

fn clear_env() {
    for name in env_vars::ALL {
        env::remove_var(name);
    }
}

fn with_token() -> PartialSettings {
    PartialSettings {
        plex_token: Some("secret-token".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_defaults_applied() {
    let settings = Settings::resolve(with_token()).unwrap();

    assert_eq!(settings.plex_url, defaults::PLEX_URL);
    assert_eq!(settings.broker_url, defaults::BROKER_URL);
    assert_eq!(settings.port, defaults::PORT);
    assert_eq!(settings.imdb_base_url, defaults::IMDB_BASE_URL);
    assert_eq!(settings.workers, defaults::WORKERS);
    assert_eq!(settings.max_attempts, 3);
    assert_eq!(settings.retry_delay, Duration::from_secs(300));
    assert_eq!(settings.log_format, LogFormat::Pretty);
}

#[test]
fn test_missing_token_is_fatal() {
    let result = Settings::resolve(PartialSettings::default());
    assert!(matches!(result, Err(Error::Config(_))));

    let blank = PartialSettings {
        plex_token: Some("   ".to_string()),
        ..Default::default()
    };
    assert!(matches!(Settings::resolve(blank), Err(Error::Config(_))));
}

#[test]
fn test_zero_attempts_rejected() {
    let layers = PartialSettings {
        max_attempts: Some(0),
        ..with_token()
    };
    assert!(matches!(Settings::resolve(layers), Err(Error::Config(_))));
}

#[test]
fn test_trailing_slash_trimmed() {
    let layers = PartialSettings {
        plex_url: Some("http://nas:32400/".to_string()),
        imdb_base_url: Some("https://imdb.test//".to_string()),
        ..with_token()
    };
    let settings = Settings::resolve(layers).unwrap();

    assert_eq!(settings.plex_url, "http://nas:32400");
    assert_eq!(settings.imdb_base_url, "https://imdb.test");
}

#[test]
fn test_unknown_log_format_rejected() {
    let layers = PartialSettings {
        log_format: Some("xml".to_string()),
        ..with_token()
    };
    assert!(Settings::resolve(layers).is_err());
}

#[test]
fn test_toml_layer_parses() {
    let toml = r#"
        plex_url = "http://plex.lan:32400"
        plex_token = "from-toml"
        port = 8080
        log_format = "json"
    "#;
    let layer = PartialSettings::from_toml_str(toml).unwrap();
    let settings = Settings::resolve(layer).unwrap();

    assert_eq!(settings.plex_url, "http://plex.lan:32400");
    assert_eq!(settings.plex_token, "from-toml");
    assert_eq!(settings.port, 8080);
    assert_eq!(settings.log_format, LogFormat::Json);
}

#[test]
fn test_toml_unknown_key_rejected() {
    assert!(PartialSettings::from_toml_str("plex_tokn = \"typo\"").is_err());
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    env::set_var(env_vars::PLEX_TOKEN, "from-env");
    env::set_var(env_vars::PORT, "9000");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "plex_token = \"from-toml\"\nport = 8080\nworkers = 4").unwrap();

    let settings = Settings::load(PartialSettings::default(), Some(file.path())).unwrap();

    assert_eq!(settings.plex_token, "from-env");
    assert_eq!(settings.port, 9000);
    // Not set in ENV, falls through to TOML
    assert_eq!(settings.workers, 4);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(env_vars::PLEX_TOKEN, "from-env");
    env::set_var(env_vars::PLEX_URL, "http://env:32400");

    let cli = PartialSettings {
        plex_url: Some("http://cli:32400".to_string()),
        ..Default::default()
    };
    let settings = Settings::load(cli, None).unwrap();

    assert_eq!(settings.plex_url, "http://cli:32400");
    assert_eq!(settings.plex_token, "from-env");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_number_rejected() {
    clear_env();
    env::set_var(env_vars::PLEX_TOKEN, "from-env");
    env::set_var(env_vars::PORT, "not-a-port");

    let result = Settings::load(PartialSettings::default(), None);
    assert!(matches!(result, Err(Error::Config(_))));

    clear_env();
}

#[test]
#[serial]
fn test_missing_toml_file_is_error() {
    clear_env();
    env::set_var(env_vars::PLEX_TOKEN, "from-env");

    let result = Settings::load(
        PartialSettings::default(),
        Some(std::path::Path::new("/nonexistent/plexkw.toml")),
    );
    assert!(matches!(result, Err(Error::Config(_))));

    clear_env();
}
