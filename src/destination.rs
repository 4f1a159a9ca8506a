use crate::folders::path_exists;
use crate::protocol::ToolCallResult;
use crate::tier::Tier;
use anyhow::{anyhow, Result};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Write access to the destination tier. The folder is fixed at construction;
/// callers only ever supply a flat file name.
#[derive(Debug, Clone)]
pub struct Destination {
	root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineChanges {
	pub added: usize,
	pub removed: usize,
}

impl Destination {
	pub fn new(base_path: &Path) -> Self {
		Self {
			root: Tier::DestinoFinal.path(base_path)
		}
	}

	fn resolve(&self, file_name: &str) -> Result<PathBuf> {
		validate_file_name(file_name)?;
		Ok(self.root.join(file_name))
	}

	pub async fn create_file(&self, file_name: &str, content: &str) -> Result<ToolCallResult> {
		let path = match self.resolve(file_name) {
			Ok(path) => path,
			Err(err) => return Ok(ToolCallResult::error(err.to_string())),
		};
		let written = async {
			fs::create_dir_all(&self.root).await?;
			fs::write(&path, content).await
		}.await;
		match written {
			Ok(()) => {
				info!(file = %file_name, bytes = content.len(), "created file in destination");
				Ok(ToolCallResult::text(format!(
					"File created in {}: {} ({} bytes)",
					Tier::DestinoFinal,
					path.display(),
					content.len()
				)))
			}
			Err(err) => Ok(ToolCallResult::error(format!("Error creating file {}: {}", file_name, err))),
		}
	}

	pub async fn modify_file(&self, file_name: &str, content: &str) -> Result<ToolCallResult> {
		let path = match self.resolve(file_name) {
			Ok(path) => path,
			Err(err) => return Ok(ToolCallResult::error(err.to_string())),
		};
		if !is_file(&path).await {
			return Ok(not_found(file_name));
		}
		let existing = fs::read_to_string(&path).await.unwrap_or_default();
		match fs::write(&path, content).await {
			Ok(()) => {
				let changes = line_changes(&existing, content);
				info!(file = %file_name, added = changes.added, removed = changes.removed, "modified file in destination");
				Ok(ToolCallResult::text(format!(
					"File modified in {}: {} (+{} -{} lines)",
					Tier::DestinoFinal,
					path.display(),
					changes.added,
					changes.removed
				)))
			}
			Err(err) => Ok(ToolCallResult::error(format!("Error modifying file {}: {}", file_name, err))),
		}
	}

	pub async fn delete_file(&self, file_name: &str) -> Result<ToolCallResult> {
		let path = match self.resolve(file_name) {
			Ok(path) => path,
			Err(err) => return Ok(ToolCallResult::error(err.to_string())),
		};
		if !is_file(&path).await {
			return Ok(not_found(file_name));
		}
		match fs::remove_file(&path).await {
			Ok(()) => {
				info!(file = %file_name, "deleted file from destination");
				Ok(ToolCallResult::text(format!("File deleted from {}: {}", Tier::DestinoFinal, path.display())))
			}
			Err(err) => Ok(ToolCallResult::error(format!("Error deleting file {}: {}", file_name, err))),
		}
	}
}

pub fn validate_file_name(file_name: &str) -> Result<()> {
	let trimmed = file_name.trim();
	if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
		return Err(anyhow!("Invalid file name: {:?}", file_name));
	}
	if file_name.contains('/') || file_name.contains('\\') || file_name.contains('\0') {
		return Err(anyhow!(
			"Invalid file name: {:?} (only flat file names are allowed in {})",
			file_name,
			Tier::DestinoFinal
		));
	}
	Ok(())
}

async fn is_file(path: &Path) -> bool {
	if !path_exists(path).await {
		return false;
	}
	fs::metadata(path)
		.await
		.map(|meta| meta.is_file())
		.unwrap_or(false)
}

fn not_found(file_name: &str) -> ToolCallResult {
	ToolCallResult::text(format!("File not found in {}: {}", Tier::DestinoFinal, file_name))
}

pub fn line_changes(before: &str, after: &str) -> LineChanges {
	let diff = TextDiff::from_lines(before, after);
	let mut changes = LineChanges::default();
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Insert => changes.added += 1,
			ChangeTag::Delete => changes.removed += 1,
			ChangeTag::Equal => {}
		}
	}
	changes
}
