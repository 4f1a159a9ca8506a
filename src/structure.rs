use crate::folders::{list_entries, path_exists, EntryKind};
use crate::protocol::ToolCallResult;
use crate::tier::{self, Tier};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
	Exists,
	Missing,
	Created,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderCheck {
	pub folder: &'static str,
	pub path: String,
	pub status: FolderStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureReport {
	pub base_path: String,
	pub folders: Vec<FolderCheck>,
	pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOperations {
	pub read: Vec<&'static str>,
	pub write: Vec<&'static str>,
	pub create: Vec<&'static str>,
	pub delete: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
	pub file_operations: FileOperations,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedConfig {
	pub version: &'static str,
	pub folders: Vec<&'static str>,
	pub capabilities: Capabilities,
	pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatistics {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub modified: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStatistics {
	pub folder: &'static str,
	pub path: String,
	pub exists: bool,
	pub file_count: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_size: Option<u64>,
	pub files: Vec<FileStatistics>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

async fn is_dir(path: &Path) -> bool {
	fs::metadata(path)
		.await
		.map(|meta| meta.is_dir())
		.unwrap_or(false)
}

pub async fn validate_structure(base: &Path, create_missing: bool) -> Result<StructureReport> {
	let mut folders = Vec::with_capacity(Tier::ALL.len());
	for tier in Tier::ALL {
		let path = tier.path(base);
		let status = if is_dir(&path).await {
			FolderStatus::Exists
		}
		else if create_missing {
			fs::create_dir_all(&path).await?;
			info!(folder = %tier, "created missing folder");
			FolderStatus::Created
		}
		else {
			FolderStatus::Missing
		};
		folders.push(FolderCheck {
			folder: tier.folder_name(),
			path: path.display().to_string(),
			status
		});
	}
	let valid = folders.iter().all(|check| check.status != FolderStatus::Missing);
	Ok(StructureReport {
		base_path: base.display().to_string(),
		folders,
		valid
	})
}

pub async fn validate_mcp_structure(base: &Path, create_missing: bool) -> Result<ToolCallResult> {
	let report = validate_structure(base, create_missing).await?;
	let summary = if report.valid {
		"All MCP folders are present."
	}
	else {
		"Some MCP folders are missing; call again with createMissing=true to create them."
	};
	Ok(ToolCallResult::text(format!(
		"MCP structure validation for {}:\n{}\n{}",
		report.base_path,
		serde_json::to_string_pretty(&report)?,
		summary
	)))
}

pub fn exported_config() -> ExportedConfig {
	let writable = tier::writable_folder_names();
	ExportedConfig {
		version: env!("CARGO_PKG_VERSION"),
		folders: tier::folder_names(),
		capabilities: Capabilities {
			file_operations: FileOperations {
				read: tier::folder_names(),
				write: writable.clone(),
				create: writable.clone(),
				delete: writable
			}
		},
		timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
	}
}

pub async fn export_mcp_config(output_path: &Path, include_secrets: bool) -> Result<ToolCallResult> {
	if include_secrets {
		debug!("includeSecrets is reserved; no secret material is exported");
	}
	let exported = exported_config();
	let payload = serde_json::to_string_pretty(&exported)?;
	if let Some(parent) = output_path.parent() {
		if !parent.as_os_str().is_empty() {
			fs::create_dir_all(parent).await?;
		}
	}
	fs::write(output_path, &payload).await?;
	info!(path = %output_path.display(), "exported MCP configuration");
	Ok(ToolCallResult::text(format!(
		"MCP configuration exported to {}:\n{}",
		output_path.display(),
		payload
	)))
}

pub async fn folder_statistics(base: &Path, tier: Tier, include_size: bool) -> FolderStatistics {
	let path = tier.path(base);
	let mut stats = FolderStatistics {
		folder: tier.folder_name(),
		path: path.display().to_string(),
		exists: path_exists(&path).await,
		file_count: 0,
		total_size: include_size.then_some(0),
		files: Vec::new(),
		error: None
	};
	if !stats.exists {
		return stats;
	}
	let entries = match list_entries(&path).await {
		Ok(entries) => entries,
		Err(err) => {
			warn!(folder = %tier, error = %err, "folder statistics unavailable");
			stats.error = Some(format!("Error: {}", err));
			return stats;
		}
	};
	for entry in entries.into_iter().filter(|entry| entry.kind == EntryKind::File) {
		let meta = fs::metadata(&entry.path).await.ok();
		let size = meta.as_ref().map(|meta| meta.len());
		let modified = meta.as_ref()
			.and_then(|meta| meta.modified().ok())
			.map(|time| DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true));
		stats.file_count += 1;
		if let (Some(total), Some(size)) = (stats.total_size.as_mut(), size) {
			*total += size;
		}
		stats.files.push(FileStatistics {
			name: entry.name,
			size: if include_size {
				size
			}
			else {
				None
			},
			modified
		});
	}
	stats
}

pub async fn get_file_statistics(base: &Path, folder: Option<Tier>, include_size: bool) -> Result<ToolCallResult> {
	let tiers = match folder {
		Some(tier) => vec![tier],
		None => Tier::ALL.to_vec(),
	};
	let mut folders = Vec::with_capacity(tiers.len());
	for tier in tiers {
		folders.push(folder_statistics(base, tier, include_size).await);
	}
	let total_files: usize = folders.iter()
		.map(|stats| stats.file_count)
		.sum();
	let mut summary = format!("Total: {} file(s)", total_files);
	if include_size {
		let total_size: u64 = folders.iter()
			.filter_map(|stats| stats.total_size)
			.sum();
		summary.push_str(&format!(", {} bytes", total_size));
	}
	Ok(ToolCallResult::text(format!(
		"File statistics:\n{}\n{}",
		serde_json::to_string_pretty(&folders)?,
		summary
	)))
}
