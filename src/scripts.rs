use crate::folders::get_local_files_info;
use crate::protocol::ToolCallResult;
use crate::structure::folder_statistics;
use crate::tier::Tier;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};

pub struct CommandOutput {
	pub status: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

pub async fn run_command(command: &[String], cwd: &Path) -> Result<CommandOutput> {
	let (program, args) = command.split_first().ok_or_else(|| anyhow!("no command configured"))?;
	let mut cmd = Command::new(program);
	cmd.args(args)
		.current_dir(cwd)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
	let mut child = cmd.spawn()?;
	let mut stdout_pipe = child.stdout.take().ok_or_else(|| anyhow!("command stdout unavailable"))?;
	let mut stderr_pipe = child.stderr.take().ok_or_else(|| anyhow!("command stderr unavailable"))?;
	let mut stdout = Vec::new();
	let mut stderr = Vec::new();
	let (out, err) = tokio::join!(
		stdout_pipe.read_to_end(&mut stdout),
		stderr_pipe.read_to_end(&mut stderr)
	);
	out?;
	err?;
	let status = child.wait().await?;
	Ok(CommandOutput {
		status: status.code(),
		stdout: String::from_utf8_lossy(&stdout).into_owned(),
		stderr: String::from_utf8_lossy(&stderr).into_owned()
	})
}

/// Runs `command` in `cwd` and renders the outcome as tool text.
pub async fn run_labeled(label: &str, command: &[String], cwd: &Path) -> ToolCallResult {
	info!(label, command = %command.join(" "), "running command");
	match run_command(command, cwd).await {
		Ok(output) => {
			let captured = captured_output(&output);
			match output.status {
				Some(0) => ToolCallResult::text(format!("{} completed successfully.{}", label, captured)),
				code => {
					let code = code.map(|code| code.to_string())
						.unwrap_or_else(|| String::from("none"));
					warn!(label, exit_code = %code, "command failed");
					ToolCallResult::error(format!("{} failed (exit code {}).{}", label, code, captured))
				}
			}
		}
		Err(err) => {
			warn!(label, error = %err, "command failed to start");
			ToolCallResult::error(format!("{} failed to start: {}", label, err))
		}
	}
}

fn captured_output(output: &CommandOutput) -> String {
	let mut text = String::new();
	if !output.stdout.trim().is_empty() {
		text.push_str("\n\nstdout:\n");
		text.push_str(output.stdout.trim_end());
	}
	if !output.stderr.trim().is_empty() {
		text.push_str("\n\nstderr:\n");
		text.push_str(output.stderr.trim_end());
	}
	text
}

pub async fn run_mcp_demo(base: &Path, command: Option<&[String]>) -> Result<ToolCallResult> {
	if let Some(command) = command {
		return Ok(run_labeled("MCP demo", command, base).await);
	}
	let mut report = String::from("MCP demo completed successfully.\n\n");
	report.push_str(&get_local_files_info(base).await);
	report.push_str("\n\nSummary:\n");
	for tier in Tier::ALL {
		let stats = folder_statistics(base, tier, true).await;
		if stats.exists {
			report.push_str(&format!(
				"- {}: {} file(s), {} bytes\n",
				tier,
				stats.file_count,
				stats.total_size.unwrap_or(0)
			));
		}
		else {
			report.push_str(&format!("- {}: missing\n", tier));
		}
	}
	Ok(ToolCallResult::text(report.trim_end().to_string()))
}

pub async fn build_mcp_server(base: &Path, command: &[String]) -> Result<ToolCallResult> {
	Ok(run_labeled("MCP server build", command, base).await)
}

pub async fn test_mcp_integration(base: &Path, command: &[String]) -> Result<ToolCallResult> {
	Ok(run_labeled("MCP integration test", command, base).await)
}
