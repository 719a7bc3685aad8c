//! Tests for tilde expansion and stderr trimming.

use rstest::rstest;

use super::super::util::stderr_tail;
use super::super::*;
use crate::test_support::EnvGuard;

#[tokio::test]
async fn expand_tilde_uses_home() {
    let _guard = EnvGuard::set_vars(&[("HOME", "/home/trainer")]).await;
    assert_eq!(expand_tilde("~/.ssh/id_rsa"), "/home/trainer/.ssh/id_rsa");
}

#[rstest]
#[case::absolute("/keys/id_rsa")]
#[case::relative("keys/id_rsa")]
#[case::bare_tilde_user("~other/.ssh/id_rsa")]
fn expand_tilde_leaves_other_paths(#[case] path: &str) {
    assert_eq!(expand_tilde(path), path);
}

#[rstest]
#[case::empty("", "")]
#[case::short("a\nb\n", "a\nb")]
fn stderr_tail_keeps_short_output(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(stderr_tail(input), expected);
}
