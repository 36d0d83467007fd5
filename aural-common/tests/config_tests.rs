//! Configuration loading and root folder resolution tests
//!
//! Tests touching AURAL_ROOT_FOLDER are marked #[serial] so they do not race
//! on the process environment.

use aural_common::config::{
    load_toml_config, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV,
};
use aural_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_toml_config(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.port, 48125);
    let names: Vec<&str> = config.vocabularies.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["word", "intent", "speaker", "emotion"]);
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("aural-ls.toml");
    std::fs::write(
        &path,
        r#"
port = 9000

[training]
batch_size = 4

[[vocabularies]]
name = "intent"
states = ["nil", "play", "pause"]
strides_per_clip = 50
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.port, 9000);
    assert_eq!(config.training.batch_size, 4);
    assert_eq!(config.training.queue_capacity, 64);
    assert_eq!(config.vocabularies.len(), 1);
    assert_eq!(config.vocabularies[0].strides_per_clip, Some(50));
}

#[test]
fn test_invalid_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("aural-ls.toml");
    std::fs::write(&path, "[training]\nbatch_size = 0\n").unwrap();

    match load_toml_config(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("batch_size")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_vocabulary_without_states_rejected() {
    let result = TomlConfig::from_toml_str(
        r#"
[[vocabularies]]
name = "word"
states = []
"#,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(Some(Path::new("/from/cli")), ROOT_FOLDER_ENV, &config);
    assert_eq!(root, PathBuf::from("/from/cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_wins_over_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, &config);
    assert_eq!(root, PathBuf::from("/from/env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV, &config),
        PathBuf::from("/from/toml")
    );

    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, &TomlConfig::default());
    assert!(root.ends_with("aural") || root.ends_with("aural_data"));
}
