use std::io::Write;
use std::time::Duration;
use uplink::config::{SyncConfig, DEFAULT_MAXAGE_MS, DEFAULT_TIMEOUT_MS, MAX_RETRY};
use uplink::{Config, Interval, RegistryError, UplinkConfig};

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.storage.directory, "./storage");
    assert_eq!(config.uplinks.len(), 1);

    let npmjs = &config.uplinks[0];
    assert_eq!(npmjs.name, "npmjs");
    assert_eq!(npmjs.url, "https://registry.npmjs.org/");
    assert_eq!(npmjs.maxage.millis(), DEFAULT_MAXAGE_MS);
    assert_eq!(npmjs.timeout.millis(), DEFAULT_TIMEOUT_MS);
    assert_eq!(npmjs.max_fails, 2);
    assert!(npmjs.cache);
    assert!(config.sync.global_timeout.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_interval_parsing() {
    let parse = |s: &str| s.parse::<Interval>().map(|i| i.millis());

    assert_eq!(parse("500ms"), Ok(500));
    assert_eq!(parse("10s"), Ok(10_000));
    assert_eq!(parse("2m"), Ok(120_000));
    assert_eq!(parse("1h"), Ok(3_600_000));
    assert_eq!(parse("1d"), Ok(86_400_000));
    assert_eq!(parse("1m30s"), Ok(90_000));
    assert_eq!(parse("1.5s"), Ok(1_500));
    assert_eq!(parse("30"), Ok(30_000));
    assert_eq!(parse("0"), Ok(0));
    assert_eq!(parse("-1m"), Ok(-60_000));

    assert!(parse("").is_err());
    assert!(parse("-").is_err());
    assert!(parse("10").is_ok());
    assert!(parse("10 parsecs").is_err());
    assert!(parse("ms").is_err());
}

#[test]
fn test_interval_out_of_range_is_rejected() {
    assert!("9999999999999y1y".parse::<Interval>().is_err());
    assert!("292471209y".parse::<Interval>().is_err());
    assert!("1e30".parse::<Interval>().is_err());
    assert!("inf".parse::<Interval>().is_err());
    assert!("-9999999999999y".parse::<Interval>().is_err());

    // Large but representable
    assert_eq!(
        "100y".parse::<Interval>().map(|i| i.millis()),
        Ok(3_153_600_000_000)
    );

    let yaml = "name: npmjs\nurl: https://registry.npmjs.org/\nmaxage: 9223372036854775807\n";
    assert!(serde_yaml::from_str::<UplinkConfig>(yaml).is_err());
}

#[test]
fn test_interval_as_duration() {
    assert_eq!(
        Interval::from_millis(1500).as_duration(),
        Some(Duration::from_millis(1500))
    );
    assert_eq!(Interval::from_millis(0).as_duration(), None);
    assert_eq!(Interval::from_millis(-10).as_duration(), None);
}

#[test]
fn test_parse_yaml_config() {
    let yaml = r#"
storage:
  directory: /var/lib/registry
uplinks:
  - name: npmjs
    url: https://registry.npmjs.org/
    maxage: 10m
    timeout: 5s
    max_fails: 3
    fail_timeout: 1m
    retry: 2
  - name: internal
    url: http://npm.internal:4873
    timeout: 30
    cache: false
    proxy: http://proxy.internal:3128
sync:
  global_timeout: 45s
"#;

    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.storage.directory, "/var/lib/registry");
    assert_eq!(config.uplinks.len(), 2);

    let npmjs = config.uplink("npmjs").unwrap();
    assert_eq!(npmjs.maxage.millis(), 600_000);
    assert_eq!(npmjs.request_timeout(), Duration::from_secs(5));
    assert_eq!(npmjs.max_fails, 3);
    assert_eq!(npmjs.fail_timeout.millis(), 60_000);
    assert_eq!(npmjs.retries(), 2);
    assert!(npmjs.cache);
    assert!(npmjs.proxy.is_none());

    let internal = config.uplink("internal").unwrap();
    assert_eq!(internal.timeout.millis(), 30_000);
    assert_eq!(internal.maxage.millis(), DEFAULT_MAXAGE_MS);
    assert!(!internal.cache);
    assert_eq!(internal.proxy.as_deref(), Some("http://proxy.internal:3128"));

    assert_eq!(
        config.sync.global_timeout.and_then(|t| t.as_duration()),
        Some(Duration::from_secs(45))
    );
    assert!(config.uplink("missing").is_none());
}

#[test]
fn test_parse_toml_config() {
    let toml_str = r#"
[storage]
directory = "./data"

[[uplinks]]
name = "npmjs"
url = "https://registry.npmjs.org/"
maxage = "-1"
retry = 100

[sync]
global_timeout = 60
"#;

    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.validate().is_ok());

    let npmjs = &config.uplinks[0];
    assert_eq!(npmjs.maxage.millis(), -1_000);
    assert_eq!(npmjs.retries(), MAX_RETRY);
    assert_eq!(
        config.sync.global_timeout,
        Some(Interval::from_millis(60_000))
    );
}

#[test]
fn test_validate_rejects_bad_uplinks() {
    let mut config = Config {
        uplinks: vec![
            UplinkConfig::new("npmjs", "https://registry.npmjs.org/"),
            UplinkConfig::new("npmjs", "https://mirror.example.com/"),
        ],
        sync: SyncConfig::default(),
        ..Config::default()
    };
    assert!(matches!(config.validate(), Err(RegistryError::Config(_))));

    config.uplinks = vec![UplinkConfig::new("ftp", "ftp://example.com/")];
    assert!(matches!(config.validate(), Err(RegistryError::Config(_))));

    config.uplinks = vec![UplinkConfig::new("  ", "https://example.com/")];
    assert!(matches!(config.validate(), Err(RegistryError::Config(_))));

    config.uplinks = Vec::new();
    assert!(config.validate().is_ok());
}

#[test]
fn test_non_positive_timeout_falls_back_to_default() {
    let mut uplink = UplinkConfig::new("npmjs", "https://registry.npmjs.org/");
    uplink.timeout = Interval::from_millis(0);
    assert_eq!(
        uplink.request_timeout(),
        Duration::from_millis(DEFAULT_TIMEOUT_MS as u64)
    );
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();

    let yaml_path = dir.path().join("config.yaml");
    let mut file = std::fs::File::create(&yaml_path).unwrap();
    writeln!(file, "uplinks:\n  - name: npmjs\n    url: https://registry.npmjs.org/").unwrap();
    let config = Config::from_file(&yaml_path).unwrap();
    assert_eq!(config.uplinks[0].name, "npmjs");

    let toml_path = dir.path().join("config.toml");
    std::fs::write(
        &toml_path,
        "[[uplinks]]\nname = \"a\"\nurl = \"http://a\"\n\n[[uplinks]]\nname = \"a\"\nurl = \"http://b\"\n",
    )
    .unwrap();
    assert!(matches!(
        Config::from_file(&toml_path),
        Err(RegistryError::Config(_))
    ));

    let ini_path = dir.path().join("config.ini");
    std::fs::write(&ini_path, "uplinks=").unwrap();
    assert!(matches!(
        Config::from_file(&ini_path),
        Err(RegistryError::Config(_))
    ));

    assert!(matches!(
        Config::from_file(dir.path().join("missing.yaml")),
        Err(RegistryError::Config(_))
    ));
}
