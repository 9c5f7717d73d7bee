use std::{env, fs, time::Duration};

use recados_server::StorageBackend;
use recados_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("recados.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 1024

[storage]
backend = "memory"

[auth]
token_secret = "file-secret"
token_lifetime = "15m"

[cache]
ttl = "2m"
refresh_interval = "5s"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert_eq!(cfg.auth.token_lifetime, Duration::from_secs(900));
    assert_eq!(cfg.cache.ttl, Duration::from_secs(120));
    assert_eq!(cfg.cache.refresh_interval, Duration::from_secs(5));
    assert!(!cfg.redis.enabled);

    // 2) Env override wins over file
    unsafe {
        env::set_var("RECADOS__SERVER__PORT", "9091");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9091);
    unsafe {
        env::remove_var("RECADOS__SERVER__PORT");
    }

    // 3) Validation rejects a blank secret
    let invalid = toml_content.replace("\"file-secret\"", "\"  \"");
    fs::write(&path, invalid).expect("write toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.contains("auth"), "unexpected error: {err}");
}
