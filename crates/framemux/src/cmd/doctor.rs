use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use framemux_frame::{check_frame_size, contains_frame};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_table, OutputFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoints.to_config();

    let mut checks = vec![config_check(&config)];
    for (index, path) in config.input_paths().iter().enumerate() {
        checks.push(endpoint_check(&format!("input_{index}"), path));
    }
    checks.push(endpoint_check("control", &config.control_path));
    checks.push(fallback_check(args.fallback.as_deref(), args.max_frame_size));

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            print_table(
                &["CHECK", "STATUS", "DETAIL"],
                output
                    .checks
                    .iter()
                    .map(|c| {
                        vec![
                            c.name.clone(),
                            status_text(c.status).to_string(),
                            c.detail.clone(),
                        ]
                    })
                    .collect(),
            );
            println!("Result: {}", output.overall);
        }
        OutputFormat::Pretty => {
            println!("framemux doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<12} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn config_check(config: &framemux_core::MuxConfig) -> CheckResult {
    match config.validate() {
        Ok(()) => CheckResult::new(
            "config",
            CheckStatus::Pass,
            format!("{} input channel(s)", config.channel_count),
        ),
        Err(err) => CheckResult::new("config", CheckStatus::Fail, err.to_string()),
    }
}

fn endpoint_check(name: &str, path: &Path) -> CheckResult {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {
            CheckResult::new(name, CheckStatus::Pass, format!("{} is a fifo", path.display()))
        }
        Ok(_) => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("{} exists but is not a fifo", path.display()),
        ),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => CheckResult::new(
            name,
            CheckStatus::Info,
            format!("{} missing; created on first run", path.display()),
        ),
        Err(err) => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("{}: {err}", path.display()),
        ),
    }
}

fn fallback_check(path: Option<&Path>, max_frame_size: usize) -> CheckResult {
    let Some(path) = path else {
        return CheckResult::new(
            "fallback",
            CheckStatus::Skip,
            "no fallback configured; idle ticks emit nothing",
        );
    };

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            return CheckResult::new(
                "fallback",
                CheckStatus::Fail,
                format!("{}: {err}", path.display()),
            )
        }
    };

    if bytes.is_empty() {
        return CheckResult::new(
            "fallback",
            CheckStatus::Fail,
            format!("{} is empty", path.display()),
        );
    }
    if !contains_frame(&bytes) {
        return CheckResult::new(
            "fallback",
            CheckStatus::Warn,
            format!("{} has no start/end delimited frame", path.display()),
        );
    }
    if let Err(err) = check_frame_size(bytes.len(), max_frame_size) {
        return CheckResult::new(
            "fallback",
            CheckStatus::Warn,
            format!("{}: {err}", path.display()),
        );
    }
    CheckResult::new(
        "fallback",
        CheckStatus::Pass,
        format!("{} ({} bytes)", path.display(), bytes.len()),
    )
}
