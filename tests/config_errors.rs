// tests/config_errors.rs

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use vfswatch::config::{load_and_validate, parse_str, ConfigFile};
use vfswatch::errors::VfsWatchError;
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::roots::RootDirectorySet;
use vfswatch::types::{BuildId, WatchMode, WatchModePreference};
use vfswatch_test_utils::builders::ConfigFileBuilder;

fn validate(text: &str) -> Result<ConfigFile, VfsWatchError> {
    ConfigFile::try_from(parse_str(text)?)
}

#[test]
fn test_full_config_turns_into_options_and_roots() {
    let cfg = validate(
        r#"
[watch]
mode = "flat"
debounce_ms = 0
registration_timeout_ms = 500
unwatchable = ["/net/**"]

[cache]
global_cache_dirs = ["/home/me/.cache/build"]

[build.main]
roots = ["/work/app", "/work/app/out"]

[build.included.shared-lib]
roots = ["/work/shared-lib"]
"#,
    )
    .unwrap();

    let options = cfg.watch_options().unwrap();
    assert_eq!(options.mode, WatchModePreference::Flat);
    assert_eq!(options.mode.resolve(WatchMode::Hierarchical), WatchMode::Flat);
    assert_eq!(options.debounce, Duration::ZERO);
    assert_eq!(options.registration_timeout, Duration::from_millis(500));
    assert!(options.unwatchable.matching_pattern(Path::new("/net/share")).is_some());
    assert_eq!(
        options.global_cache_dirs,
        vec![PathBuf::from("/home/me/.cache/build")]
    );

    let fs = MockFileSystem::new();
    fs.add_dir("/work/app");
    let roots = cfg.to_root_set(&fs).unwrap();
    assert_eq!(roots.len(), 3);
    let shared = BuildId::included("shared-lib");
    assert_eq!(
        roots.paths_for(&shared).collect::<Vec<_>>(),
        vec![Path::new("/work/shared-lib")]
    );
}

#[test]
fn test_defaults_apply_to_omitted_sections() {
    let cfg = validate(
        r#"
[build.main]
roots = ["/work/app"]
"#,
    )
    .unwrap();

    let options = cfg.watch_options().unwrap();
    assert!(options.enabled);
    assert_eq!(options.mode, WatchModePreference::Auto);
    assert_eq!(options.debounce, Duration::from_millis(25));
    assert_eq!(options.registration_timeout, Duration::from_secs(2));
    assert!(options.global_cache_dirs.is_empty());
}

#[test]
fn test_config_without_roots_is_rejected() {
    let result = validate(
        r#"
[watch]
mode = "auto"
"#,
    );

    match result {
        Err(VfsWatchError::ConfigError(msg)) => assert!(msg.contains("at least one root")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_relative_root_returns_structured_error() {
    let raw = ConfigFileBuilder::new()
        .main_root("/work/app")
        .included_root("lib", "lib/relative")
        .raw();

    match ConfigFile::try_from(raw) {
        Err(VfsWatchError::RootNotAbsolute(path)) => {
            assert_eq!(path, PathBuf::from("lib/relative"))
        }
        Err(e) => panic!("Expected RootNotAbsolute, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_zero_registration_timeout_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .main_root("/work/app")
        .registration_timeout_ms(0)
        .raw();

    match ConfigFile::try_from(raw) {
        Err(VfsWatchError::ConfigError(msg)) => assert!(msg.contains("registration_timeout_ms")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_invalid_unwatchable_glob_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .main_root("/work/app")
        .unwatchable("/net/[")
        .raw();

    match ConfigFile::try_from(raw) {
        Err(VfsWatchError::ConfigError(msg)) => assert!(msg.contains("unwatchable")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_relative_global_cache_dir_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .main_root("/work/app")
        .global_cache_dir("caches")
        .raw();

    match ConfigFile::try_from(raw) {
        Err(VfsWatchError::ConfigError(msg)) => assert!(msg.contains("global_cache_dirs")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_field_is_a_toml_error() {
    let result = parse_str(
        r#"
[watch]
recursive = true

[build.main]
roots = ["/work/app"]
"#,
    );

    assert!(matches!(result, Err(VfsWatchError::TomlError(_))));
}

#[test]
fn test_unknown_mode_is_a_toml_error() {
    let result = parse_str(
        r#"
[watch]
mode = "polling"
"#,
    );

    assert!(matches!(result, Err(VfsWatchError::TomlError(_))));
}

#[test]
fn test_load_and_validate_reads_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[build.main]
roots = ["/work/app"]
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();

    let main = cfg.build.main.expect("main build");
    assert_eq!(main.roots, vec![PathBuf::from("/work/app")]);
}

#[test]
fn test_missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = load_and_validate(dir.path().join("vfswatch.toml"));

    assert!(matches!(result, Err(VfsWatchError::IoError(_))));
}

#[test]
fn test_root_that_is_a_file_is_rejected() {
    let fs = MockFileSystem::new();
    fs.add_file("/work/README", b"hi");
    let mut set = RootDirectorySet::new();

    let err = set.add(&fs, BuildId::Main, "/work/README").unwrap_err();

    assert!(matches!(err, VfsWatchError::RootNotADirectory(_)));
    assert!(set.is_empty());
}

#[test]
fn test_missing_root_is_accepted() {
    let fs = MockFileSystem::new();
    let mut set = RootDirectorySet::new();

    set.add(&fs, BuildId::Main, "/work/not-yet-built").unwrap();
    set.add(&fs, BuildId::Main, "/work/./app/../not-yet-built").unwrap();

    // Normalized paths collapse into one root.
    assert_eq!(set.len(), 1);
}

#[test]
fn test_relative_root_is_rejected_by_the_root_set() {
    let fs = MockFileSystem::new();
    let mut set = RootDirectorySet::new();

    let err = set.add(&fs, BuildId::Main, "work/app").unwrap_err();

    assert!(matches!(err, VfsWatchError::RootNotAbsolute(_)));
}
