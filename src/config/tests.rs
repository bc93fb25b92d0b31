use super::*;
use serial_test::serial;
use std::env;
use std::net::IpAddr;

fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }

    result
}

fn clear_gateway_env() {
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    unsafe {
        env::remove_var("PORT");
        env::remove_var("BIND_ADDR");
        env::remove_var("UPSTREAM_URL");
        env::remove_var("API_KEY");
        env::remove_var("UPSTREAM_TOKEN");
        env::remove_var("ANON_TOKEN_ENABLED");
        env::remove_var("DEBUG_MODE");
        env::remove_var("THINK_TAGS_MODE");
        env::remove_var("MAX_CONCURRENT_REQUESTS");
        env::remove_var("FINGERPRINTS_PATH");
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.port, 8080);
    assert_eq!(
        config.bind_addr,
        IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
    );
    assert_eq!(config.upstream_url, crate::constants::DEFAULT_UPSTREAM_URL);
    assert!(config.anon_token_enabled);
    assert!(!config.debug_mode);
    assert_eq!(config.think_tags_mode, ThinkTagsMode::Think);
    assert_eq!(config.max_concurrent_requests, 100);
}

#[test]
fn test_socket_addr() {
    let config = Config {
        port: 3000,
        bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        ..Default::default()
    };
    assert_eq!(config.socket_addr(), "127.0.0.1:3000");
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    clear_gateway_env();

    let config = Config::from_env().expect("should parse with defaults");

    assert_eq!(config.port, 8080);
    assert!(config.upstream_token.is_none());
    assert!(config.fingerprints_path.is_none());
}

#[test]
#[serial]
fn test_from_env_custom_values() {
    clear_gateway_env();

    with_env_vars(
        &[
            ("PORT", "3000"),
            ("UPSTREAM_URL", "http://127.0.0.1:9000/api/chat/completions"),
            ("API_KEY", "sk-test"),
            ("THINK_TAGS_MODE", "strip"),
            ("MAX_CONCURRENT_REQUESTS", "7"),
            ("DEBUG_MODE", "true"),
        ],
        || {
            let config = Config::from_env().expect("should parse");
            assert_eq!(config.port, 3000);
            assert_eq!(
                config.upstream_url,
                "http://127.0.0.1:9000/api/chat/completions"
            );
            assert_eq!(config.api_key, "sk-test");
            assert_eq!(config.think_tags_mode, ThinkTagsMode::Strip);
            assert_eq!(config.max_concurrent_requests, 7);
            assert!(config.debug_mode);
        },
    );
}

#[test]
#[serial]
fn test_from_env_rejects_port_zero() {
    clear_gateway_env();

    with_env_vars(&[("PORT", "0")], || {
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidPort { .. })
        ));
    });
}

#[test]
#[serial]
fn test_from_env_rejects_bad_think_tags_mode() {
    clear_gateway_env();

    with_env_vars(&[("THINK_TAGS_MODE", "verbose")], || {
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidThinkTagsMode { .. })
        ));
    });
}

#[test]
#[serial]
fn test_from_env_rejects_out_of_range_concurrency() {
    clear_gateway_env();

    with_env_vars(&[("MAX_CONCURRENT_REQUESTS", "1001")], || {
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidConcurrencyLimit { .. })
        ));
    });

    with_env_vars(&[("MAX_CONCURRENT_REQUESTS", "0")], || {
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidConcurrencyLimit { .. })
        ));
    });
}

#[test]
fn test_validate_requires_api_key() {
    let config = Config::default();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingApiKey)
    ));

    let config = Config {
        api_key: "sk-test".to_string(),
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_requires_token_when_anon_disabled() {
    let config = Config {
        api_key: "sk-test".to_string(),
        anon_token_enabled: false,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingUpstreamToken)
    ));

    let config = Config {
        api_key: "sk-test".to_string(),
        anon_token_enabled: false,
        upstream_token: Some("tok".to_string()),
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_think_tags_mode_parsing() {
    assert_eq!("think".parse::<ThinkTagsMode>().unwrap(), ThinkTagsMode::Think);
    assert_eq!("STRIP".parse::<ThinkTagsMode>().unwrap(), ThinkTagsMode::Strip);
    assert_eq!(" raw ".parse::<ThinkTagsMode>().unwrap(), ThinkTagsMode::Raw);
    assert!("loud".parse::<ThinkTagsMode>().is_err());
}
