//! Integration tests for layered configuration loading.

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use cloudtrain::provider::DEFAULT_API_BASE;
use cloudtrain::remote::DEFAULT_IDENTITY_FILE;
use cloudtrain::test_support::EnvGuard;
use cloudtrain::{ConfigError, ProviderConfig, SshConfig};
use rstest::rstest;
use tempfile::TempDir;

const CONFIG_VARS: &[&str] = &[
    "LAMBDALABS_KEY",
    "LAMBDALABS_API_BASE",
    "CLOUDTRAIN_SSH_SSH_BIN",
    "CLOUDTRAIN_SSH_SCP_BIN",
    "CLOUDTRAIN_SSH_IDENTITY_FILE",
    "CLOUDTRAIN_SSH_BATCH_MODE",
];

/// Writes `contents` to `cloudtrain.toml` in a fresh temporary directory.
fn config_file(contents: &str) -> (TempDir, String) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write("cloudtrain.toml", contents)
        .unwrap_or_else(|err| panic!("write config file: {err}"));
    (tmp, root.join("cloudtrain.toml").into_string())
}

#[rstest]
#[tokio::test]
async fn provider_config_reads_key_from_config_file() {
    let (_tmp, path) = config_file("key = \"file-token\"\n");
    let _guard = EnvGuard::apply(&[("CLOUDTRAIN_CONFIG_PATH", path.as_str())], CONFIG_VARS).await;

    let cfg = ProviderConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(cfg.api_key(), Ok("file-token"));
    assert_eq!(cfg.api_base, DEFAULT_API_BASE);
}

#[rstest]
#[tokio::test]
async fn environment_overrides_config_file() {
    let (_tmp, path) = config_file("key = \"file-token\"\n");
    let removed: Vec<&str> = CONFIG_VARS
        .iter()
        .copied()
        .filter(|name| *name != "LAMBDALABS_KEY")
        .collect();
    let _guard = EnvGuard::apply(
        &[
            ("CLOUDTRAIN_CONFIG_PATH", path.as_str()),
            ("LAMBDALABS_KEY", "env-token"),
        ],
        &removed,
    )
    .await;

    let cfg = ProviderConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(cfg.api_key(), Ok("env-token"));
}

#[rstest]
#[tokio::test]
async fn missing_key_fails_client_construction() {
    let (_tmp, path) = config_file("api_base = \"http://127.0.0.1:9/api/v1\"\n");
    let _guard = EnvGuard::apply(&[("CLOUDTRAIN_CONFIG_PATH", path.as_str())], CONFIG_VARS).await;

    let cfg = ProviderConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));
    let err = cfg.client().expect_err("client requires a key");

    assert!(
        matches!(err, ConfigError::MissingCredential(ref message) if message.contains("LAMBDALABS_KEY")),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn ssh_config_defaults_apply_without_sources() {
    let (_tmp, path) = config_file("");
    let _guard = EnvGuard::apply(&[("CLOUDTRAIN_CONFIG_PATH", path.as_str())], CONFIG_VARS).await;

    let cfg = SshConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("ssh config should load: {err}"));

    assert_eq!(cfg.ssh_bin, "ssh");
    assert_eq!(cfg.scp_bin, "scp");
    assert_eq!(cfg.identity_file, DEFAULT_IDENTITY_FILE);
    assert_eq!(cfg.batch_mode, None);
    assert!(cfg.batch_mode_enabled());
}

#[rstest]
#[tokio::test]
async fn batch_mode_can_be_turned_off_in_the_config_file() {
    let (_tmp, path) = config_file("batch_mode = false\n");
    let _guard = EnvGuard::apply(&[("CLOUDTRAIN_CONFIG_PATH", path.as_str())], CONFIG_VARS).await;

    let cfg = SshConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("ssh config should load: {err}"));

    assert_eq!(cfg.batch_mode, Some(false));
    assert!(!cfg.batch_mode_enabled());
}

#[rstest]
#[tokio::test]
async fn identity_flag_overrides_loaded_identity_file() {
    let (_tmp, path) = config_file("identity_file = \"~/.ssh/from-file\"\n");
    let _guard = EnvGuard::apply(&[("CLOUDTRAIN_CONFIG_PATH", path.as_str())], CONFIG_VARS).await;

    let loaded = SshConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("ssh config should load: {err}"));
    assert_eq!(loaded.identity_file, "~/.ssh/from-file");

    let overridden = loaded.with_identity_override(Some("/keys/lambda"));
    assert_eq!(overridden.identity_file, "/keys/lambda");
}

#[rstest]
fn blank_binaries_are_rejected_with_actionable_errors() {
    let cfg = SshConfig {
        ssh_bin: String::from("ssh"),
        scp_bin: String::new(),
        identity_file: String::from(DEFAULT_IDENTITY_FILE),
        batch_mode: None,
    };

    let message = cfg
        .validate()
        .expect_err("scp_bin is required")
        .to_string();

    assert!(message.contains("CLOUDTRAIN_SSH_SCP_BIN"), "{message}");
    assert!(message.contains("cloudtrain.toml"), "{message}");
}
