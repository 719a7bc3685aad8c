//! Canonical command sequence that trains and packages the topic model.
//!
//! Paths are relative to the remote user's home directory and are
//! shell-escaped; the leading `~/` is left bare so the remote shell expands
//! it.

use std::borrow::Cow;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use shell_escape::unix::escape;

use crate::remote::RemoteStep;

/// Repository holding the training project.
pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/readthedocs/ethicalads-model.git";

/// Checkout location relative to the remote home directory.
pub const DEFAULT_CHECKOUT_DIR: &str = "checkouts/ethicalads-model";

/// spaCy package name of the trained model, without language prefix.
pub const DEFAULT_MODEL_NAME: &str = "ethicalads_topics";

/// Labelled corpus used to build the train and test sets.
pub const DEFAULT_CORPUS_PATH: &str = "assets/categorized-data.yml";

const GPU_DIAGNOSTICS: &[&str] = &[
    "nvidia-smi",
    "python -c 'import torch; print(torch.cuda.is_available())'",
    "python -c 'import cupy; import cupyx; print(cupy.cuda.runtime.getDeviceCount())'",
    "python -c 'import spacy; print(spacy.require_gpu())'",
];

/// Where the model comes from and what it is called once packaged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrainingRecipe {
    /// Git URL cloned onto the instance.
    pub repository_url: String,
    /// Checkout directory relative to the remote home directory.
    pub checkout_dir: Utf8PathBuf,
    /// Model name passed to the spaCy project.
    pub model_name: String,
    /// Language prefix spaCy adds to packaged model names.
    pub language: String,
    /// Corpus file relative to the checkout.
    pub corpus_path: String,
}

impl Default for TrainingRecipe {
    fn default() -> Self {
        Self {
            repository_url: DEFAULT_REPOSITORY_URL.to_owned(),
            checkout_dir: Utf8PathBuf::from(DEFAULT_CHECKOUT_DIR),
            model_name: DEFAULT_MODEL_NAME.to_owned(),
            language: String::from("en"),
            corpus_path: DEFAULT_CORPUS_PATH.to_owned(),
        }
    }
}

fn quoted(value: &str) -> Cow<'_, str> {
    escape(value.into())
}

fn home_relative(path: &Utf8Path) -> String {
    format!("~/{}", quoted(path.as_str()))
}

/// Renders the model version from the run's start time, for example
/// `20240102_03_04_05`.
#[must_use]
pub fn version_tag(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H_%M_%S").to_string()
}

impl TrainingRecipe {
    /// Returns the ordered remote steps for one training run.
    ///
    /// GPU diagnostics sit between dependency installation and corpus
    /// preparation and are omitted when `include_diagnostics` is false.
    #[must_use]
    pub fn steps(&self, version: &str, include_diagnostics: bool) -> Vec<RemoteStep> {
        let checkout = home_relative(&self.checkout_dir);
        let in_checkout = |command: &str| format!("cd {checkout} && {command}");

        let mut steps = vec![
            RemoteStep::required(self.clone_command()),
            RemoteStep::required(in_checkout("pip install -r requirements.txt")),
        ];
        if include_diagnostics {
            steps.extend(GPU_DIAGNOSTICS.iter().copied().map(RemoteStep::diagnostic));
        }
        steps.push(RemoteStep::required(in_checkout(&format!(
            "python scripts/generate-training-test-sets.py -o assets/train.json -f assets/test.json {}",
            quoted(&self.corpus_path)
        ))));
        steps.push(RemoteStep::required(in_checkout(&format!(
            "python -m spacy project run all . --vars.train=train --vars.dev=test \
             --vars.name={} --vars.version={}",
            quoted(&self.model_name),
            quoted(version)
        ))));
        steps
    }

    /// Remote glob matching the packaged model tarball.
    #[must_use]
    pub fn artifact_glob(&self) -> String {
        let package = format!("{}_{}", self.language, self.model_name);
        format!(
            "{}/packages/{package}*/dist/{package}-*.tar.gz",
            home_relative(&self.checkout_dir)
        )
    }

    fn clone_command(&self) -> String {
        let checkout = home_relative(&self.checkout_dir);
        let mkdir = self
            .checkout_dir
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(|parent| format!("mkdir -p {} && ", home_relative(parent)))
            .unwrap_or_default();
        format!("{mkdir}git clone {} {checkout}", quoted(&self.repository_url))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::clock::Clock;
    use crate::remote::StepKind;
    use crate::test_support::ManualClock;

    fn commands(steps: &[RemoteStep]) -> Vec<&str> {
        steps.iter().map(|step| step.command.as_str()).collect()
    }

    #[rstest]
    fn default_recipe_produces_canonical_sequence() {
        let steps = TrainingRecipe::default().steps("20240102_03_04_05", true);
        let clone = format!(
            "mkdir -p ~/checkouts && git clone {} ~/checkouts/ethicalads-model",
            quoted(DEFAULT_REPOSITORY_URL)
        );

        assert_eq!(
            commands(&steps),
            vec![
                clone.as_str(),
                "cd ~/checkouts/ethicalads-model && pip install -r requirements.txt",
                "nvidia-smi",
                "python -c 'import torch; print(torch.cuda.is_available())'",
                "python -c 'import cupy; import cupyx; print(cupy.cuda.runtime.getDeviceCount())'",
                "python -c 'import spacy; print(spacy.require_gpu())'",
                "cd ~/checkouts/ethicalads-model && python scripts/generate-training-test-sets.py -o assets/train.json -f assets/test.json assets/categorized-data.yml",
                "cd ~/checkouts/ethicalads-model && python -m spacy project run all . --vars.train=train --vars.dev=test --vars.name=ethicalads_topics --vars.version=20240102_03_04_05",
            ]
        );
    }

    #[rstest]
    fn only_gpu_checks_are_diagnostic() {
        let steps = TrainingRecipe::default().steps("v", true);
        let kinds: Vec<StepKind> = steps.iter().map(|step| step.kind).collect();

        assert_eq!(
            kinds,
            vec![
                StepKind::Required,
                StepKind::Required,
                StepKind::Diagnostic,
                StepKind::Diagnostic,
                StepKind::Diagnostic,
                StepKind::Diagnostic,
                StepKind::Required,
                StepKind::Required,
            ]
        );
    }

    #[rstest]
    fn skipping_diagnostics_keeps_required_order() {
        let steps = TrainingRecipe::default().steps("v", false);

        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|step| !step.is_diagnostic()));
    }

    #[rstest]
    fn unsafe_values_are_shell_escaped() {
        let recipe = TrainingRecipe {
            checkout_dir: Utf8PathBuf::from("my checkouts/model"),
            model_name: String::from("topics; rm -rf /"),
            ..TrainingRecipe::default()
        };

        let steps = recipe.steps("v1", false);
        let clone = steps.first().expect("clone step");
        let train = steps.last().expect("train step");

        assert!(
            clone.command.starts_with("mkdir -p ~/'my checkouts' && git clone "),
            "{}",
            clone.command
        );
        assert!(
            clone.command.ends_with(" ~/'my checkouts/model'"),
            "{}",
            clone.command
        );
        assert!(
            train.command.contains("--vars.name='topics; rm -rf /'"),
            "{}",
            train.command
        );
    }

    #[rstest]
    fn top_level_checkout_skips_mkdir() {
        let recipe = TrainingRecipe {
            checkout_dir: Utf8PathBuf::from("model"),
            ..TrainingRecipe::default()
        };

        let steps = recipe.steps("v", false);
        let clone = steps.first().expect("clone step");
        assert!(clone.command.starts_with("git clone "), "{}", clone.command);
    }

    #[rstest]
    fn artifact_glob_matches_packaged_tarball() {
        assert_eq!(
            TrainingRecipe::default().artifact_glob(),
            "~/checkouts/ethicalads-model/packages/en_ethicalads_topics*/dist/en_ethicalads_topics-*.tar.gz"
        );
    }

    #[rstest]
    fn version_tag_uses_clock_time() {
        assert_eq!(version_tag(ManualClock::default().now()), "20240102_03_04_05");
    }
}
