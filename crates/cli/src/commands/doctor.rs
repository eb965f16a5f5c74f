use std::path::Path;

use chokepoint_agent::{llm::HttpLlmClient, prompts::PromptLibrary};
use chokepoint_core::config::{AppConfig, LoadOptions};
use chokepoint_core::store::StateFile;
use serde::Serialize;

use super::{CommandResult, EXIT_CHECKS_FAILED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, state_path: Option<&Path>) -> CommandResult {
    let report = build_report(state_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECKS_FAILED };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(state_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_llm_client(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            checks.push(DoctorCheck::new(
                "llm_client",
                CheckStatus::Skipped,
                "skipped because configuration did not load",
            ));
        }
    }
    checks.push(check_prompt_library());
    checks.push(check_state_file(state_path));

    // Skipped checks are informational; only an explicit failure fails the run.
    let healthy = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Builds the provider client without sending a request.
fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    match HttpLlmClient::from_config(&config.llm) {
        Ok(_) => DoctorCheck::new(
            "llm_client",
            CheckStatus::Pass,
            format!("{} client ready for model `{}`", config.llm.provider.as_str(), config.llm.model),
        ),
        Err(error) => DoctorCheck::new("llm_client", CheckStatus::Fail, format!("{error:#}")),
    }
}

fn check_prompt_library() -> DoctorCheck {
    match PromptLibrary::new() {
        Ok(_) => DoctorCheck::new("prompt_library", CheckStatus::Pass, "prompt templates parsed"),
        Err(error) => DoctorCheck::new("prompt_library", CheckStatus::Fail, error.to_string()),
    }
}

fn check_state_file(state_path: Option<&Path>) -> DoctorCheck {
    let Some(path) = state_path else {
        return DoctorCheck::new("state_file", CheckStatus::Skipped, "no --state file given");
    };

    match StateFile::new(path).load() {
        Ok(state) => DoctorCheck::new(
            "state_file",
            CheckStatus::Pass,
            format!("`{}` readable, {} bottleneck(s)", path.display(), state.bottlenecks.len()),
        ),
        Err(error) => DoctorCheck::new("state_file", CheckStatus::Fail, error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
