//! Settings loading from files and environment overrides

use std::io::Write;

use gen_router::config::settings::Settings;

#[test]
fn load_missing_file_yields_defaults() {
    let settings = Settings::load_from_path("/nonexistent/config.toml").unwrap();
    assert_eq!(settings.routing.default_strategy, "priority");
    assert!(settings.routing.enable_fallback);
    assert_eq!(settings.race.soft_timeout_secs, 30);
    assert_eq!(settings.race.overall_timeout_secs, 120);
}

#[test]
fn load_from_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[routing]
default_strategy = "adaptive"
fallback_image_providers = ["backup", "spare"]
provider_timeout_secs = 25

[race]
stagger_interval_secs = 5

[[providers]]
name = "acme"
base_url = "https://api.acme.test"
priority = 1

[providers.auth]
kind = "bearer"
api_key = "sk-test"

[[providers.models]]
id = "acme-v1"
name = "Acme V1"
provider = "acme"
media_type = "image"
is_default = true
"#
    )
    .unwrap();

    let settings = Settings::load_from_path(file.path()).unwrap();
    assert_eq!(settings.routing.default_strategy, "adaptive");
    assert_eq!(
        settings.routing.fallback_image_providers,
        vec!["backup".to_string(), "spare".to_string()]
    );
    assert_eq!(settings.routing.provider_timeout_secs, 25);
    assert_eq!(settings.race.stagger_interval_secs, 5);
    // Unset race values keep defaults
    assert_eq!(settings.race.overall_timeout_secs, 120);

    assert_eq!(settings.providers.len(), 1);
    let provider = &settings.providers[0];
    assert_eq!(provider.name, "acme");
    assert_eq!(provider.auth.api_key, "sk-test");
    assert_eq!(provider.models[0].id, "acme-v1");
    assert!(provider.models[0].is_default);

    settings.validate().unwrap();
}
