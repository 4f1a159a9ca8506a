use crate::protocol::ToolCallResult;
use crate::tier::{self, Tier};
use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

const PREVIEW_EXTENSIONS: [&str; 5] = [".js", ".ts", ".py", ".java", ".cs"];
const PREVIEW_MAX_SIZE: u64 = 2000;
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
	File,
	Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: EntryKind,
	pub path: String,
	pub extension: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderContext {
	pub folder_name: String,
	pub files: Vec<FileInfo>,
	pub total_files: usize,
}

#[derive(Debug, Clone)]
pub struct Entry {
	pub name: String,
	pub kind: EntryKind,
	pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
	Content(String),
	NotFound(PathBuf),
	OutsideFolders(PathBuf),
}

pub async fn path_exists(path: &Path) -> bool {
	fs::try_exists(path).await.unwrap_or(false)
}

/// Immediate children in the order the filesystem returns them.
pub async fn list_entries(folder: &Path) -> Result<Vec<Entry>> {
	let mut entries = Vec::new();
	let mut reader = fs::read_dir(folder).await?;
	while let Some(entry) = reader.next_entry().await? {
		let path = entry.path();
		let Some(kind) = classify(&path, entry.file_type().await).await else {
			continue;
		};
		entries.push(Entry {
			name: entry.file_name().to_string_lossy().to_string(),
			kind,
			path
		});
	}
	Ok(entries)
}

/// `None` drops the entry from listings when its type cannot be determined.
async fn classify(path: &Path, file_type: std::io::Result<std::fs::FileType>) -> Option<EntryKind> {
	let file_type = match file_type {
		Ok(file_type) => file_type,
		Err(err) => {
			warn!(path = %path.display(), error = %err, "skipping entry with unknown type");
			return None;
		}
	};
	let is_dir = if file_type.is_symlink() {
		fs::metadata(path)
			.await
			.map(|meta| meta.is_dir())
			.unwrap_or(false)
	}
	else {
		file_type.is_dir()
	};
	if is_dir {
		Some(EntryKind::Directory)
	}
	else {
		Some(EntryKind::File)
	}
}

pub fn extension_of(name: &str) -> String {
	Path::new(name)
		.extension()
		.map(|ext| format!(".{}", ext.to_string_lossy()))
		.unwrap_or_default()
}

pub fn truncate_content(content: &str, max_chars: usize) -> String {
	match content.char_indices().nth(max_chars) {
		Some((end, _)) => format!("{}{}", &content[..end], TRUNCATION_MARKER),
		None => content.to_string(),
	}
}

pub async fn list_files_in_folder(base: &Path, tier: Tier) -> Result<ToolCallResult> {
	let folder = tier.path(base);
	if !path_exists(&folder).await {
		return Ok(ToolCallResult::text(format!("Folder not found: {}", folder.display())));
	}
	let entries = match list_entries(&folder).await {
		Ok(entries) => entries,
		Err(err) => {
			return Ok(ToolCallResult::error(format!("Error reading folder {}: {}", folder.display(), err)));
		}
	};
	let listing = entries.iter()
		.map(|entry| json!({
			"name": entry.name,
			"type": entry.kind,
			"path": entry.path.display().to_string()
		}))
		.collect::<Vec<_>>();
	Ok(ToolCallResult::text(format!(
		"Files in {}:\n{}",
		tier,
		serde_json::to_string_pretty(&listing)?
	)))
}

pub async fn read_file(base: &Path, file_path: &str) -> Result<ReadOutcome> {
	let resolved = tier::normalize_path(&base.join(file_path));
	if tier::tier_containing(base, &resolved).is_none() {
		return Ok(ReadOutcome::OutsideFolders(resolved));
	}
	if !path_exists(&resolved).await {
		return Ok(ReadOutcome::NotFound(resolved));
	}
	let content = fs::read_to_string(&resolved).await?;
	Ok(ReadOutcome::Content(content))
}

pub async fn read_file_content(base: &Path, file_path: &str) -> Result<ToolCallResult> {
	let result = match read_file(base, file_path).await {
		Ok(ReadOutcome::Content(content)) => ToolCallResult::text(format!("Content of {}:\n\n{}", file_path, content)),
		Ok(ReadOutcome::NotFound(_)) => ToolCallResult::text(format!("File not found: {}", file_path)),
		Ok(ReadOutcome::OutsideFolders(path)) => ToolCallResult::error(format!(
			"Access denied: {} is outside the MCP folders ({})",
			path.display(),
			tier::folder_names().join(", ")
		)),
		Err(err) => ToolCallResult::error(format!("Error reading file {}: {}", file_path, err)),
	};
	Ok(result)
}

pub async fn search_files_by_extension(base: &Path, extension: &str) -> Result<ToolCallResult> {
	let mut results = Vec::new();
	for tier in Tier::ALL {
		let folder = tier.path(base);
		let files = if !path_exists(&folder).await {
			vec!["Folder not found".to_string()]
		}
		else {
			match list_entries(&folder).await {
				Ok(entries) => entries.into_iter()
					.filter(|entry| entry.kind == EntryKind::File && entry.name.ends_with(extension))
					.map(|entry| entry.path.display().to_string())
					.collect(),
				Err(err) => vec![format!("Error: {}", err)],
			}
		};
		results.push(json!({
			"folder": tier.folder_name(),
			"files": files
		}));
	}
	Ok(ToolCallResult::text(format!(
		"Files with extension {}:\n{}",
		extension,
		serde_json::to_string_pretty(&results)?
	)))
}

pub async fn get_folder_context(
	folder_path: &Path,
	folder_name: &str,
	include_content: bool,
	max_content_length: usize) -> FolderContext {
	let mut context = FolderContext {
		folder_name: folder_name.to_string(),
		files: Vec::new(),
		total_files: 0
	};
	if !path_exists(folder_path).await {
		return context;
	}
	let entries = match list_entries(folder_path).await {
		Ok(entries) => entries,
		Err(err) => {
			warn!(folder = %folder_path.display(), error = %err, "folder context unavailable");
			return context;
		}
	};
	for entry in entries {
		let content = if include_content && entry.kind == EntryKind::File {
			match fs::read_to_string(&entry.path).await {
				Ok(text) => Some(truncate_content(&text, max_content_length)),
				Err(err) => Some(format!("Error reading file: {}", err)),
			}
		}
		else {
			None
		};
		if entry.kind == EntryKind::File {
			context.total_files += 1;
		}
		context.files.push(FileInfo {
			extension: extension_of(&entry.name),
			path: entry.path.display().to_string(),
			name: entry.name,
			kind: entry.kind,
			content
		});
	}
	context
}

pub async fn get_all_folders_context(base: &Path, include_content: bool, max_content_length: usize) -> Vec<FolderContext> {
	let mut contexts = Vec::with_capacity(Tier::ALL.len());
	for tier in Tier::ALL {
		contexts.push(get_folder_context(
			&tier.path(base),
			tier.folder_name(),
			include_content,
			max_content_length
		).await);
	}
	contexts
}

pub async fn all_folders_context_tool(base: &Path, include_content: bool, max_content_length: usize) -> Result<ToolCallResult> {
	let contexts = get_all_folders_context(base, include_content, max_content_length).await;
	let total: usize = contexts.iter()
		.map(|context| context.total_files)
		.sum();
	Ok(ToolCallResult::text(format!(
		"Context of {} folder(s) with {} file(s):\n{}",
		contexts.len(),
		total,
		serde_json::to_string_pretty(&contexts)?
	)))
}

pub async fn get_local_files_info(base: &Path) -> String {
	let mut info = String::new();
	for tier in Tier::ALL {
		let folder = tier.path(base);
		if !path_exists(&folder).await {
			info.push_str(&format!("\n=== {} ===\nFolder not found at: {}\n", tier, folder.display()));
			continue;
		}
		let entries = match list_entries(&folder).await {
			Ok(entries) => entries,
			Err(err) => {
				info.push_str(&format!("\n=== {} ===\nError accessing folder: {}\n", tier, err));
				continue;
			}
		};
		info.push_str(&format!("\n=== Files in {} ===\n", tier));
		for entry in entries {
			if entry.kind == EntryKind::Directory {
				info.push_str(&format!("- {}/ (directory)\n", entry.name));
				continue;
			}
			let extension = extension_of(&entry.name);
			let label = if extension.is_empty() {
				"no extension"
			}
			else {
				extension.as_str()
			};
			let size = match fs::metadata(&entry.path).await {
				Ok(meta) => meta.len(),
				Err(err) => {
					info.push_str(&format!("- {} ({}) - Error reading file info: {}\n", entry.name, label, err));
					continue;
				}
			};
			info.push_str(&format!("- {} ({}) - {} bytes\n", entry.name, label, size));
			if PREVIEW_EXTENSIONS.contains(&extension.as_str()) && size < PREVIEW_MAX_SIZE {
				match fs::read_to_string(&entry.path).await {
					Ok(content) => {
						let preview: String = content.chars()
							.take(PREVIEW_CHARS)
							.collect();
						info.push_str(&format!("  Preview: {}...\n", preview.replace('\n', "\\n")));
					}
					Err(err) => info.push_str(&format!("  Error reading file: {}\n", err)),
				}
			}
		}
	}
	info
}

pub fn format_context_for_ai(contexts: &[FolderContext]) -> String {
	let mut out = String::from("=== MCP FOLDERS CONTEXT ===\n");
	for context in contexts {
		let tier = Tier::from_folder_name(&context.folder_name);
		let role = tier
			.map(|tier| format!(" ({}, {})", tier.role(), tier.capability_label()))
			.unwrap_or_default();
		out.push_str(&format!("\n## {}{} - {} file(s)\n", context.folder_name, role, context.total_files));
		if context.files.is_empty() {
			out.push_str("(empty)\n");
			continue;
		}
		for file in &context.files {
			match file.kind {
				EntryKind::Directory => out.push_str(&format!("- {}/ (directory)\n", file.name)),
				EntryKind::File => {
					out.push_str(&format!("\n### {}\n", file.name));
					if let Some(content) = &file.content {
						let fence = file.extension.trim_start_matches('.');
						out.push_str(&format!("```{}\n{}\n```\n", fence, content));
					}
				}
			}
		}
	}
	out.push_str(&format!(
		"\nWrite operations (create, modify, delete) are only allowed in \"{}\".\n",
		tier::writable_folder_names().join(", ")
	));
	out
}

pub async fn format_context_tool(base: &Path, include_content: bool, max_content_length: usize) -> Result<ToolCallResult> {
	let contexts = get_all_folders_context(base, include_content, max_content_length).await;
	Ok(ToolCallResult::text(format_context_for_ai(&contexts)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write(path: &Path, contents: &str) {
		std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
		std::fs::write(path, contents).expect("write file");
	}

	#[test]
	fn truncation_keeps_limit_and_appends_marker() {
		let long = "abcdefghij".repeat(3);
		let truncated = truncate_content(&long, 12);
		assert_eq!(truncated, format!("abcdefghijab{}", TRUNCATION_MARKER));
		assert_eq!(truncate_content("short", 12), "short");
		assert_eq!(truncate_content("ção", 2), format!("çã{}", TRUNCATION_MARKER));
	}

	#[test]
	fn extension_includes_dot() {
		assert_eq!(extension_of("main.rs"), ".rs");
		assert_eq!(extension_of("Makefile"), "");
	}

	#[tokio::test]
	async fn all_folders_context_has_three_entries_in_order() {
		let base = tempfile::tempdir().expect("tempdir");
		write(&base.path().join("primaria/a.js"), "let a = 1;");
		write(&base.path().join("primaria/b.js"), "let b = 2;");
		std::fs::create_dir_all(base.path().join("primaria/nested")).expect("mkdir");
		write(&base.path().join("destino final/out.py"), "print(1)");
		let contexts = get_all_folders_context(base.path(), true, 2000).await;
		let names: Vec<&str> = contexts.iter()
			.map(|context| context.folder_name.as_str())
			.collect();
		assert_eq!(names, vec!["primaria", "intermediario", "destino final"]);
		assert_eq!(contexts[0].total_files, 2);
		assert_eq!(contexts[0].files.len(), 3);
		assert_eq!(contexts[1].total_files, 0);
		assert!(contexts[1].files.is_empty());
		assert_eq!(contexts[2].total_files, 1);
		assert_eq!(contexts[2].files[0].content.as_deref(), Some("print(1)"));
	}

	#[tokio::test]
	async fn folder_context_truncates_long_files() {
		let base = tempfile::tempdir().expect("tempdir");
		let folder = base.path().join("primaria");
		write(&folder.join("long.txt"), &"x".repeat(50));
		let context = get_folder_context(&folder, "primaria", true, 10).await;
		let content = context.files[0].content.clone().expect("content");
		assert_eq!(content, format!("{}{}", "x".repeat(10), TRUNCATION_MARKER));
		let without = get_folder_context(&folder, "primaria", false, 10).await;
		assert!(without.files[0].content.is_none());
	}

	#[tokio::test]
	async fn unreadable_file_is_reported_inline() {
		let base = tempfile::tempdir().expect("tempdir");
		let folder = base.path().join("intermediario");
		std::fs::create_dir_all(&folder).expect("mkdir");
		std::fs::write(folder.join("blob.bin"), [0xff, 0xfe, 0x00, 0x80]).expect("write");
		write(&folder.join("ok.txt"), "fine");
		let context = get_folder_context(&folder, "intermediario", true, 100).await;
		assert_eq!(context.total_files, 2);
		let blob = context.files.iter()
			.find(|file| file.name == "blob.bin")
			.expect("blob");
		assert!(blob.content.as_deref().unwrap_or("").starts_with("Error reading file:"));
		let ok = context.files.iter()
			.find(|file| file.name == "ok.txt")
			.expect("ok");
		assert_eq!(ok.content.as_deref(), Some("fine"));
	}

	#[tokio::test]
	async fn missing_folder_is_described_not_thrown() {
		let base = tempfile::tempdir().expect("tempdir");
		let result = list_files_in_folder(base.path(), Tier::Primaria).await.expect("result");
		assert!(!result.is_error);
		assert!(result.first_text().starts_with("Folder not found:"));
	}

	#[tokio::test]
	async fn search_uses_suffix_and_placeholders() {
		let base = tempfile::tempdir().expect("tempdir");
		write(&base.path().join("primaria/a.js"), "");
		write(&base.path().join("primaria/a.json"), "");
		write(&base.path().join("destino final/b.js"), "");
		let result = search_files_by_extension(base.path(), ".js").await.expect("result");
		let text = result.first_text();
		let json_start = text.find('[').expect("json");
		let parsed: Value = serde_json::from_str(&text[json_start..]).expect("parse");
		let folders = parsed.as_array().expect("array");
		assert_eq!(folders.len(), 3);
		let order: Vec<&str> = folders.iter()
			.filter_map(|folder| folder["folder"].as_str())
			.collect();
		assert_eq!(order, vec!["primaria", "intermediario", "destino final"]);
		assert_eq!(folders[0]["files"].as_array().map(Vec::len), Some(1));
		assert_eq!(folders[1]["files"], json!(["Folder not found"]));
		assert_eq!(folders[2]["files"].as_array().map(Vec::len), Some(1));
	}

	#[tokio::test]
	async fn reads_are_scoped_to_tier_folders() {
		let base = tempfile::tempdir().expect("tempdir");
		write(&base.path().join("destino final/a.txt"), "hello");
		write(&base.path().join("secret.txt"), "top secret");
		let outcome = read_file(base.path(), "destino final/a.txt").await.expect("read");
		assert_eq!(outcome, ReadOutcome::Content("hello".to_string()));
		let outcome = read_file(base.path(), "primaria/../secret.txt").await.expect("read");
		assert!(matches!(outcome, ReadOutcome::OutsideFolders(_)));
		let outcome = read_file(base.path(), "primaria/none.txt").await.expect("read");
		assert!(matches!(outcome, ReadOutcome::NotFound(_)));
	}

	#[tokio::test]
	async fn local_files_info_previews_small_code_files() {
		let base = tempfile::tempdir().expect("tempdir");
		write(&base.path().join("primaria/app.js"), "const x = 1;\nconsole.log(x);");
		write(&base.path().join("primaria/README"), "docs");
		let info = get_local_files_info(base.path()).await;
		assert!(info.contains("=== Files in primaria ==="));
		assert!(info.contains("- app.js (.js) - "));
		assert!(info.contains("Preview: const x = 1;\\nconsole.log(x);..."));
		assert!(info.contains("- README (no extension) - 4 bytes"));
		assert!(info.contains("=== intermediario ===\nFolder not found at:"));
	}

	#[tokio::test]
	async fn entries_with_unknown_type_are_skipped() {
		let base = tempfile::tempdir().expect("tempdir");
		let failed = std::io::Error::new(std::io::ErrorKind::Other, "stat failed");
		assert_eq!(classify(base.path(), Err(failed)).await, None);
		let file_type = std::fs::metadata(base.path()).expect("metadata").file_type();
		assert_eq!(classify(base.path(), Ok(file_type)).await, Some(EntryKind::Directory));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn local_files_info_reports_unreadable_metadata() {
		let base = tempfile::tempdir().expect("tempdir");
		let folder = base.path().join("primaria");
		std::fs::create_dir_all(&folder).expect("mkdir");
		std::os::unix::fs::symlink(folder.join("gone.js"), folder.join("dangling.js")).expect("symlink");
		write(&folder.join("ok.js"), "let a;");
		let info = get_local_files_info(base.path()).await;
		assert!(info.contains("- dangling.js (.js) - Error reading file info:"));
		assert!(!info.contains("dangling.js (.js) - 0 bytes"));
		assert!(info.contains("- ok.js (.js) - 6 bytes"));
	}

	#[test]
	fn ai_context_marks_capabilities() {
		let contexts = vec![
			FolderContext {
				folder_name: "primaria".to_string(),
				files: vec![FileInfo {
					name: "a.py".to_string(),
					kind: EntryKind::File,
					path: "/x/primaria/a.py".to_string(),
					extension: ".py".to_string(),
					content: Some("print(1)".to_string())
				}],
				total_files: 1
			},
			FolderContext {
				folder_name: "destino final".to_string(),
				files: Vec::new(),
				total_files: 0
			},
		];
		let text = format_context_for_ai(&contexts);
		assert!(text.contains("## primaria (source, read-only) - 1 file(s)"));
		assert!(text.contains("```py\nprint(1)\n```"));
		assert!(text.contains("## destino final (destination, read/write/create/delete) - 0 file(s)\n(empty)"));
	}
}
