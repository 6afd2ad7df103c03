//! Integration tests for layered configuration
//!
//! Precedence: CLI arguments > environment variables > config file > defaults

use faixa_core::config::{CliConfigOverrides, ConfigSource, LayeredConfig};
use faixa_core::fields::Field;
use faixa_core::FaixaError;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_VARS: [&str; 6] = [
    "FAIXA_BUFFER_M",
    "FAIXA_CLEARANCE_M",
    "FAIXA_PROTECTION_ATTRIBUTE",
    "FAIXA_RISK_RADII",
    "FAIXA_DATABASE_URL",
    "DATABASE_URL",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_partial_file_configuration() {
    let file = config_file(
        r#"
[analysis]
clearance_m = 3.5
# everything else stays default
"#,
    );

    let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

    assert_eq!(config.clearance_m.value, 3.5);
    assert_eq!(config.clearance_m.source, ConfigSource::File);
    assert_eq!(config.buffer_m.value, 50.0);
    assert_eq!(config.buffer_m.source, ConfigSource::Default);
    assert_eq!(config.aliases.source, ConfigSource::Default);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let file = config_file(
        r#"
[analysis]
buffer_m = 80.0
risk_radii = [150.0]

[database]
url = "postgres://file@localhost/faixa"
"#,
    );

    env::set_var("FAIXA_BUFFER_M", "120");
    env::set_var("FAIXA_RISK_RADII", "50,100");
    env::set_var("DATABASE_URL", "postgres://env@localhost/faixa");

    let config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();

    assert_eq!(config.buffer_m.value, 120.0);
    assert_eq!(config.buffer_m.source, ConfigSource::Environment);
    assert_eq!(config.risk_radii.value, vec![50.0, 100.0]);
    assert_eq!(config.database_url.value.as_deref(), Some("postgres://env@localhost/faixa"));
    assert_eq!(config.database_url.source, ConfigSource::Environment);

    clear_env();
}

#[test]
#[serial]
fn test_prefixed_database_url_wins_over_generic() {
    clear_env();
    env::set_var("DATABASE_URL", "postgres://generic/faixa");
    env::set_var("FAIXA_DATABASE_URL", "postgres://prefixed/faixa");

    let config = LayeredConfig::with_defaults().load_from_env();
    assert_eq!(config.database_url.value.as_deref(), Some("postgres://prefixed/faixa"));

    clear_env();
}

#[test]
#[serial]
fn test_invalid_environment_values_are_ignored() {
    clear_env();
    env::set_var("FAIXA_BUFFER_M", "wide");
    env::set_var("FAIXA_CLEARANCE_M", "-2");
    env::set_var("FAIXA_RISK_RADII", "100,,x");

    let config = LayeredConfig::with_defaults().load_from_env();

    assert_eq!(config.buffer_m.value, 50.0);
    assert_eq!(config.buffer_m.source, ConfigSource::Default);
    assert_eq!(config.clearance_m.value, 5.0);
    assert_eq!(config.risk_radii.source, ConfigSource::Default);

    clear_env();
}

#[test]
#[serial]
fn test_configuration_precedence_order() {
    clear_env();
    let file = config_file("[analysis]\nprotection_attribute = \"from_file\"");
    env::set_var("FAIXA_PROTECTION_ATTRIBUTE", "from_env");

    let mut config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();
    assert_eq!(config.protection_attribute.value, "from_env");

    config.update_from_cli(CliConfigOverrides {
        protection_attribute: Some("from_cli".to_string()),
        ..Default::default()
    });
    assert_eq!(config.protection_attribute.value, "from_cli");
    assert_eq!(config.protection_attribute.source, ConfigSource::Cli);

    clear_env();
}

#[test]
#[serial]
fn test_load_with_explicit_file() {
    clear_env();
    let file = config_file(
        r#"
[aliases]
span = ["trecho"]
risk_class = ["nivel", "classe_risco"]
"#,
    );

    let config = LayeredConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.aliases.source, ConfigSource::File);
    assert_eq!(config.aliases.value.aliases(Field::Span), vec!["trecho"]);
    assert_eq!(config.aliases.value.aliases(Field::RiskClass), vec!["nivel", "classe_risco"]);
    let inspection = config.to_inspection_map();
    assert_eq!(inspection["aliases"].0, "custom: risk_class, span");
}

#[test]
fn test_invalid_toml_file() {
    let file = config_file("[analysis\nbuffer_m = ");
    let err = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, FaixaError::ConfigInvalid { ref key, .. } if key == "file"));
}

#[test]
fn test_missing_config_file() {
    let result = LayeredConfig::with_defaults().load_from_file("/nonexistent/faixa.toml");
    assert!(result.is_err());
}

#[test]
fn test_empty_alias_list_is_rejected() {
    let file = config_file("[aliases]\nlatitude = []");
    let err = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("aliases.latitude"));
}
