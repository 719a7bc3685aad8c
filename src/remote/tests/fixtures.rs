//! Shared fixtures for remote module tests.

use rstest::fixture;

use super::super::*;

#[fixture]
pub fn base_config() -> SshConfig {
    SshConfig {
        ssh_bin: String::from("ssh"),
        scp_bin: String::from("scp"),
        identity_file: String::from("/keys/id_rsa"),
        batch_mode: None,
    }
}
