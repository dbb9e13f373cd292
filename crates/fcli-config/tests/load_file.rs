use fcli_config::{ConfigError, ConfigLoader};
use std::fs;
use tempfile::tempdir;

#[test]
fn relative_actions_dir_is_anchored_at_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fcli.yaml");
    fs::write(
        &path,
        "actions_dir: actions\nbackends:\n  ssc:\n    base_url: https://ssc.example.com\n",
    )
    .unwrap();

    let config = ConfigLoader::default().load(Some(&path)).unwrap();
    assert_eq!(config.actions_dir, Some(dir.path().join("actions")));
    assert!(config.backend("ssc").is_some());
}

#[test]
fn json_files_are_supported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fcli.json");
    fs::write(&path, r#"{"max_sub_action_depth": 4}"#).unwrap();

    let config = ConfigLoader::default().load_from_file(&path).unwrap();
    assert_eq!(config.max_sub_action_depth, 4);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let result = ConfigLoader::default().load(Some(&dir.path().join("absent.yaml")));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
