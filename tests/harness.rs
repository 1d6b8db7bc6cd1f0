//! Fixture-driven harness: every directory under `tests/programs/` holds a
//! `program.my` plus a `case.yaml` describing the expected outcome.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use mython::Error;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum CaseClass {
    RuntimeSuccess,
    FrontendError,
    RuntimeError,
}

#[derive(Debug, Deserialize)]
struct ExpectedOutcome {
    stdout_file: Option<String>,
    error_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaseSpec {
    class: CaseClass,
    expected: ExpectedOutcome,
}

#[derive(Debug)]
struct Case {
    name: String,
    dir: PathBuf,
    source: String,
    spec: CaseSpec,
}

impl Case {
    fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {relative_path}", self.name))
    }
}

fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let spec_path = path.join("case.yaml");
        let spec_raw = fs::read_to_string(&spec_path)
            .with_context(|| format!("Reading {}", spec_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&spec_raw)
            .with_context(|| format!("Parsing {}", spec_path.display()))?;
        let source = fs::read_to_string(path.join("program.my"))
            .with_context(|| format!("Missing program.my for case {name}"))?;

        cases.push(Case {
            name,
            dir: path,
            source,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

fn run_case(case: &Case) -> Result<()> {
    let mut sink = Vec::new();
    let result = mython::run(&case.source, &mut sink);
    let output = String::from_utf8(sink).with_context(|| format!("Output of {}", case.name))?;

    match case.spec.class {
        CaseClass::RuntimeSuccess => {
            result.with_context(|| format!("Case {} failed", case.name))?;
            let stdout_file = case
                .spec
                .expected
                .stdout_file
                .as_deref()
                .with_context(|| format!("Missing stdout_file in {}", case.name))?;
            let expected = case.read_text(stdout_file)?;
            ensure!(
                normalize_output(&output) == normalize_output(&expected),
                "Output mismatch for {}: got\n{output}",
                case.name
            );
        }
        CaseClass::FrontendError | CaseClass::RuntimeError => {
            let error = match result {
                Ok(()) => anyhow::bail!("Case {} unexpectedly succeeded", case.name),
                Err(error) => error,
            };
            let frontend = matches!(error, Error::Lex(_) | Error::Parse(_));
            ensure!(
                frontend == (case.spec.class == CaseClass::FrontendError),
                "Wrong error kind for {}: {error}",
                case.name
            );
            let fragment = case
                .spec
                .expected
                .error_contains
                .as_deref()
                .with_context(|| format!("Missing error_contains in {}", case.name))?;
            let message = error.to_string();
            ensure!(
                message.contains(fragment),
                "Expected error containing '{fragment}' in {}, got '{message}'",
                case.name
            );
        }
    }
    Ok(())
}

#[test]
fn runs_program_fixtures() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in cases {
        run_case(&case)?;
    }
    Ok(())
}
