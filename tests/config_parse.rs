use hwpx_edit::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../hwpx-edit.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.container.body_part, "Contents/section0.xml");
    assert_eq!(cfg.paths.staging_dir, "temp_hwpx");
    assert_eq!(cfg.paths.output_dir, "final_output");
    assert!(cfg.llm.user_template.contains("{request}"));
    assert!(cfg.llm.user_template.contains("{document}"));
    assert!(cfg.batch.plan_attempts >= 1);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[llm]\nbase_url = \"http://localhost:1\"\nmodel = \"m\"\napi_key_env = \"K\"\ntemperature = 0.0\ntimeout_seconds = 5\nmax_request_bytes = 10\njson_response_format = false\nsystem_prompt = \"s\"\nuser_template = \"{document}\"\n")
        .expect("parse TOML");
    assert_eq!(cfg.llm.model, "m");
    assert_eq!(cfg.output.suffix, "_edited");
    assert_eq!(cfg.formats.legacy_extensions, vec!["hwp".to_string()]);
}

#[test]
fn empty_file_is_default_config() {
    let cfg: Config = toml::from_str("").expect("parse TOML");
    assert_eq!(cfg.output.extension, "hwp");
    assert_eq!(cfg.llm.api_key_env, "OPENROUTER_API_KEY");
}
