use crate::protocol::ToolCallResult;
use crate::tier::Tier;
use anyhow::{anyhow, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//.*$").expect("line comment regex"));
static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static AROUND_OPEN_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\{\s*").expect("brace regex"));
static AROUND_CLOSE_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\}\s*").expect("brace regex"));
static AROUND_SEMICOLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*;\s*").expect("semicolon regex"));
static AROUND_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").expect("comma regex"));
static SYMBOLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[{}()\[\]<>=+\-*/%!&|^~;:,]").expect("symbol regex"));
static STRING_LITERALS: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).expect("string regex"));
static PYTHON_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(def|class)\s+\w+.*:\s*$").expect("python regex"));
static TS_ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r":\s*(string|number|boolean|any|void)\b|\binterface\s+\w+").expect("typescript regex"));
static RUST_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfn\s+\w+\s*(<[^>]*>)?\s*\(").expect("rust regex"));

const KEYWORD_REDUCTIONS: [(&str, &str); 5] = [
	("function", "fn"),
	("const ", "c "),
	("let ", "l "),
	("var ", "v "),
	("return ", "r "),
];

const LANGUAGE_EXTENSIONS: [(&str, &str); 13] = [
	("javascript", ".js"),
	("typescript", ".ts"),
	("python", ".py"),
	("java", ".java"),
	("csharp", ".cs"),
	("cpp", ".cpp"),
	("ruby", ".rb"),
	("go", ".go"),
	("rust", ".rs"),
	("php", ".php"),
	("kotlin", ".kt"),
	("swift", ".swift"),
	("dart", ".dart"),
];

pub const NETWORK_PROVIDERS: [&str; 5] = ["openai", "gemini", "anthropic", "llama", "llama-local"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimplificationOptions {
	pub remove_comments: bool,
	pub reduce_keywords: bool,
	pub minify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
	pub target_language: String,
	#[serde(default = "default_provider")]
	pub provider: String,
	#[serde(default)]
	pub api_key: Option<String>,
}

fn default_provider() -> String {
	String::from("passthrough")
}

pub fn simplify(code: &str, _file_extension: &str, options: SimplificationOptions) -> String {
	let mut result = code.to_string();
	if options.remove_comments {
		result = LINE_COMMENT.replace_all(&result, "").into_owned();
		result = BLOCK_COMMENT.replace_all(&result, "").into_owned();
	}
	if options.reduce_keywords {
		for (keyword, replacement) in KEYWORD_REDUCTIONS {
			result = result.replace(keyword, replacement);
		}
	}
	if options.minify {
		result = WHITESPACE.replace_all(&result, " ").into_owned();
		result = AROUND_OPEN_BRACE.replace_all(&result, "{").into_owned();
		result = AROUND_CLOSE_BRACE.replace_all(&result, "}").into_owned();
		result = AROUND_SEMICOLON.replace_all(&result, ";").into_owned();
		result = AROUND_COMMA.replace_all(&result, ",").into_owned();
	}
	result
}

pub fn detect_extension(code: &str) -> &'static str {
	if code.contains("<?php") {
		".php"
	}
	else if code.contains("#include") {
		".cpp"
	}
	else if code.contains("package main") || code.contains("func main()") {
		".go"
	}
	else if code.contains("using System") {
		".cs"
	}
	else if code.contains("public class") || code.contains("System.out.") {
		".java"
	}
	else if RUST_FN.is_match(code) && (code.contains("let ") || code.contains("->") || code.contains("pub ")) {
		".rs"
	}
	else if PYTHON_DEF.is_match(code) {
		".py"
	}
	else if TS_ANNOTATION.is_match(code) {
		".ts"
	}
	else {
		".js"
	}
}

pub fn language_for_extension(extension: &str) -> &'static str {
	match extension.to_lowercase().as_str() {
		".ts" | ".tsx" => "typescript",
		".py" => "python",
		".java" => "java",
		".cs" => "csharp",
		".cpp" | ".cc" | ".cxx" | ".hpp" | ".h" | ".c" => "cpp",
		".rb" => "ruby",
		".go" => "go",
		".rs" => "rust",
		".php" => "php",
		".kt" => "kotlin",
		".swift" => "swift",
		".dart" => "dart",
		_ => "javascript",
	}
}

pub fn converted_file_name(relative: &Path, target_language: &str) -> PathBuf {
	let target = target_language.to_lowercase();
	let extension = LANGUAGE_EXTENSIONS
		.iter()
		.find(|(language, _)| *language == target)
		.map(|(_, ext)| ext.trim_start_matches('.').to_string())
		.or_else(|| {
			relative.extension().map(|ext| ext.to_string_lossy().to_string())
		});
	match extension {
		Some(ext) => relative.with_extension(ext),
		None => relative.to_path_buf(),
	}
}

pub fn estimate_token_count(text: &str) -> usize {
	let without_blocks = BLOCK_COMMENT.replace_all(text, "");
	let stripped = LINE_COMMENT.replace_all(&without_blocks, "");
	let words = stripped.split_whitespace().count();
	let symbols = SYMBOLS.find_iter(&stripped).count();
	let strings: usize = STRING_LITERALS
		.find_iter(&stripped)
		.map(|literal| literal.as_str().chars().count().div_ceil(4))
		.sum();
	words + symbols + strings
}

pub fn format_file_size(bytes: u64) -> String {
	const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
	let mut size = bytes as f64;
	let mut unit = 0usize;
	while size >= 1024.0 && unit < UNITS.len() - 1 {
		size /= 1024.0;
		unit += 1;
	}
	format!("{:.2} {}", size, UNITS[unit])
}

pub fn simplify_code_tool(code: &str, file_extension: Option<&str>, options: SimplificationOptions) -> ToolCallResult {
	let extension = file_extension
		.filter(|ext| !ext.trim().is_empty())
		.map(|ext| {
			if ext.starts_with('.') {
				ext.to_string()
			}
			else {
				format!(".{}", ext)
			}
		})
		.unwrap_or_else(|| detect_extension(code).to_string());
	let simplified = simplify(code, &extension, options);
	ToolCallResult::text(format!(
		"Simplified code ({}, {} -> {} tokens):\n\n{}",
		extension,
		estimate_token_count(code),
		estimate_token_count(&simplified),
		simplified
	))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenMetrics {
	pub sent: usize,
	pub received: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetrics {
	pub tokens: TokenMetrics,
	#[serde(rename = "processingTime")]
	pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
	pub code: String,
	pub metrics: ConversionMetrics,
}

#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
	pub code: &'a str,
	pub source_language: &'a str,
	pub target_language: &'a str,
	pub provider: &'a str,
	pub api_key: Option<&'a str>,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Code conversion collaborator used by `process_files`.
pub trait Converter: Send + Sync {
	fn convert<'a>(&'a self, request: ConversionRequest<'a>) -> BoxFuture<'a, Result<Conversion>>;
}

/// Converter available without network access: `passthrough` copies the code unchanged,
/// every remote provider is reported as unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineConverter;

impl Converter for OfflineConverter {
	fn convert<'a>(&'a self, request: ConversionRequest<'a>) -> BoxFuture<'a, Result<Conversion>> {
		Box::pin(async move {
			let started = Instant::now();
			debug!(
				from = request.source_language,
				to = request.target_language,
				provider = request.provider,
				with_key = request.api_key.is_some(),
				"converting"
			);
			match request.provider {
				"passthrough" | "none" => {
					let tokens = estimate_token_count(request.code);
					Ok(Conversion {
						code: request.code.to_string(),
						metrics: ConversionMetrics {
							tokens: TokenMetrics {
								sent: tokens,
								received: tokens
							},
							processing_time_ms: started.elapsed().as_millis() as u64
						}
					})
				}
				provider if NETWORK_PROVIDERS.contains(&provider) => Err(anyhow!(
					"conversion provider {} is not available in this server",
					provider
				)),
				provider => Err(anyhow!("unsupported conversion provider: {}", provider)),
			}
		})
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
	pub original: String,
	pub original_tokens: usize,
	pub simplified_tokens: usize,
	pub original_size: String,
	pub simplified_size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
	pub original: String,
	pub converted: String,
	pub metrics: ConversionMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
	pub file: String,
	pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
	pub source_folder: String,
	pub output_folder: String,
	pub processed_files: Vec<ProcessedFile>,
	pub converted_files: Vec<ConvertedFile>,
	pub failures: Vec<BatchFailure>,
	pub skipped: usize,
}

pub struct BatchJob<'a> {
	pub source: &'a Path,
	pub output: &'a Path,
	pub simplification: SimplificationOptions,
	pub conversion: &'a ConversionOptions,
	pub skip_patterns: &'a [String],
}

fn build_skip_set(patterns: &[String]) -> Result<Option<GlobSet>> {
	if patterns.is_empty() {
		return Ok(None);
	}
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = GlobBuilder::new(pattern)
			.case_insensitive(true)
			.build()
			.map_err(|err| anyhow!("invalid skip pattern {}: {}", pattern, err))?;
		builder.add(glob);
	}
	Ok(Some(builder.build().map_err(|err| anyhow!("invalid skip patterns: {}", err))?))
}

/// Regular files under `root`, recursively, minus the ones whose name matches `skip`.
fn collect_source_files(root: &Path, skip: Option<&GlobSet>) -> Result<(Vec<PathBuf>, usize)> {
	let mut builder = WalkBuilder::new(root);
	builder.standard_filters(false);
	builder.sort_by_file_name(|a, b| a.cmp(b));
	let mut files = Vec::new();
	let mut skipped = 0usize;
	for entry in builder.build() {
		let entry = entry?;
		if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
			continue;
		}
		let skip_match = skip
			.map(|set| set.is_match(entry.file_name()))
			.unwrap_or(false);
		if skip_match {
			skipped += 1;
			continue;
		}
		files.push(entry.into_path());
	}
	Ok((files, skipped))
}

pub async fn process_files(job: BatchJob<'_>, converter: &dyn Converter) -> Result<BatchReport> {
	let skip = build_skip_set(job.skip_patterns)?;
	let (files, skipped) = collect_source_files(job.source, skip.as_ref())?;
	fs::create_dir_all(job.output).await?;
	let mut report = BatchReport {
		source_folder: job.source.display().to_string(),
		output_folder: job.output.display().to_string(),
		processed_files: Vec::new(),
		converted_files: Vec::new(),
		failures: Vec::new(),
		skipped
	};
	for path in files {
		let relative = path.strip_prefix(job.source)
			.unwrap_or(&path)
			.to_path_buf();
		let label = relative.display().to_string();
		let original = match fs::read_to_string(&path).await {
			Ok(content) => content,
			Err(err) => {
				warn!(file = %label, error = %err, "skipping unreadable source file");
				report.failures.push(BatchFailure {
					file: label,
					error: format!("read failed: {}", err)
				});
				continue;
			}
		};
		let extension = relative.extension()
			.map(|ext| format!(".{}", ext.to_string_lossy()))
			.unwrap_or_default();
		let simplified = simplify(&original, &extension, job.simplification);
		report.processed_files.push(ProcessedFile {
			original: label.clone(),
			original_tokens: estimate_token_count(&original),
			simplified_tokens: estimate_token_count(&simplified),
			original_size: format_file_size(original.len() as u64),
			simplified_size: format_file_size(simplified.len() as u64)
		});
		let request = ConversionRequest {
			code: &simplified,
			source_language: language_for_extension(&extension),
			target_language: &job.conversion.target_language,
			provider: &job.conversion.provider,
			api_key: job.conversion.api_key.as_deref()
		};
		let conversion = match converter.convert(request).await {
			Ok(conversion) => conversion,
			Err(err) => {
				warn!(file = %label, error = %err, "conversion failed");
				report.failures.push(BatchFailure {
					file: label,
					error: format!("conversion failed: {}", err)
				});
				continue;
			}
		};
		let target = job.output.join(converted_file_name(&relative, &job.conversion.target_language));
		let written = async {
			if let Some(parent) = target.parent() {
				fs::create_dir_all(parent).await?;
			}
			fs::write(&target, &conversion.code).await
		}.await;
		if let Err(err) = written {
			report.failures.push(BatchFailure {
				file: label,
				error: format!("write failed: {}", err)
			});
			continue;
		}
		report.converted_files.push(ConvertedFile {
			original: label,
			converted: target.display().to_string(),
			metrics: conversion.metrics
		});
	}
	info!(
		processed = report.processed_files.len(),
		converted = report.converted_files.len(),
		failed = report.failures.len(),
		"batch processing finished"
	);
	Ok(report)
}

pub async fn process_files_tool(
	base: &Path,
	source: Tier,
	output: Tier,
	simplification: SimplificationOptions,
	conversion: &ConversionOptions,
	skip_patterns: &[String],
	converter: &dyn Converter) -> Result<ToolCallResult> {
	if !output.is_writable() {
		return Ok(ToolCallResult::error(format!(
			"Output folder {} is read-only; process_files can only write to {}",
			output,
			Tier::DestinoFinal
		)));
	}
	let source_path = source.path(base);
	if !crate::folders::path_exists(&source_path).await {
		return Ok(ToolCallResult::text(format!("Source folder not found: {}", source_path.display())));
	}
	let output_path = output.path(base);
	let report = process_files(
		BatchJob {
			source: &source_path,
			output: &output_path,
			simplification,
			conversion,
			skip_patterns
		},
		converter
	).await?;
	let message = format!(
		"Processed {} file(s) from {}: {} converted to {}, {} failed, {} skipped.",
		report.processed_files.len(),
		source,
		report.converted_files.len(),
		conversion.target_language,
		report.failures.len(),
		report.skipped
	);
	let result_text = format!("{}\n{}", message, serde_json::to_string_pretty(&report)?);
	if report.failures.is_empty() {
		Ok(ToolCallResult::text(result_text))
	}
	else {
		Ok(ToolCallResult {
			is_error: report.converted_files.is_empty(),
			..ToolCallResult::text(result_text)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = "// greet\nfunction greet(name) {\n  /* build */\n  const msg = 'hi ' + name;\n  return msg;\n}\n";

	#[test]
	fn removes_line_and_block_comments() {
		let options = SimplificationOptions {
			remove_comments: true,
			..Default::default()
		};
		let out = simplify(SAMPLE, ".js", options);
		assert!(!out.contains("//"));
		assert!(!out.contains("/*"));
		assert!(out.contains("function greet(name)"));
	}

	#[test]
	fn reduces_keywords() {
		let options = SimplificationOptions {
			reduce_keywords: true,
			..Default::default()
		};
		let out = simplify(SAMPLE, ".js", options);
		assert!(out.contains("fn greet(name)"));
		assert!(out.contains("c msg = 'hi ' + name;"));
		assert!(out.contains("r msg;"));
	}

	#[test]
	fn minify_collapses_whitespace() {
		let options = SimplificationOptions {
			minify: true,
			..Default::default()
		};
		let out = simplify("a , b ;\n{\n  c\n}\n", ".js", options);
		assert_eq!(out, "a,b;{c}");
	}

	#[test]
	fn no_options_is_identity() {
		assert_eq!(simplify(SAMPLE, ".js", SimplificationOptions::default()), SAMPLE);
	}

	#[test]
	fn detects_common_languages() {
		assert_eq!(detect_extension("def main():\n    print('x')\n"), ".py");
		assert_eq!(detect_extension("public class Main { }"), ".java");
		assert_eq!(detect_extension("fn main() {\n    let x = 1;\n}"), ".rs");
		assert_eq!(detect_extension("interface User { name: string }"), ".ts");
		assert_eq!(detect_extension("console.log(1);"), ".js");
	}

	#[test]
	fn converted_names_follow_target_language() {
		assert_eq!(converted_file_name(Path::new("lib/util.js"), "python"), PathBuf::from("lib/util.py"));
		assert_eq!(converted_file_name(Path::new("a.js"), "Rust"), PathBuf::from("a.rs"));
		assert_eq!(converted_file_name(Path::new("a.js"), "cobol"), PathBuf::from("a.js"));
	}

	#[test]
	fn token_estimate_counts_words_symbols_and_strings() {
		assert_eq!(estimate_token_count(""), 0);
		assert_eq!(estimate_token_count("a = b;"), 5);
		assert_eq!(estimate_token_count("// only a comment"), 0);
	}

	#[test]
	fn file_sizes_use_binary_units() {
		assert_eq!(format_file_size(512), "512.00 B");
		assert_eq!(format_file_size(2048), "2.00 KB");
		assert_eq!(format_file_size(3 * 1024 * 1024), "3.00 MB");
	}

	#[tokio::test]
	async fn offline_converter_rejects_remote_providers() {
		let converter = OfflineConverter;
		let request = ConversionRequest {
			code: "x = 1",
			source_language: "python",
			target_language: "javascript",
			provider: "openai",
			api_key: Some("key")
		};
		let err = converter.convert(request).await.expect_err("unavailable");
		assert!(err.to_string().contains("not available"));
		let ok = converter.convert(ConversionRequest {
			provider: "passthrough",
			..request
		}).await.expect("passthrough");
		assert_eq!(ok.code, "x = 1");
		assert_eq!(ok.metrics.tokens.sent, ok.metrics.tokens.received);
	}

	#[tokio::test]
	async fn batch_writes_into_output_and_skips_binaries() {
		let base = tempfile::tempdir().expect("tempdir");
		let source = base.path().join("primaria");
		std::fs::create_dir_all(source.join("lib")).expect("mkdir");
		std::fs::write(source.join("main.js"), "// entry\nconst a = 1;\n").expect("write");
		std::fs::write(source.join("lib/util.js"), "function u() { return 2; }\n").expect("write");
		std::fs::write(source.join("logo.PNG"), [0u8, 1, 2]).expect("write");
		let output = base.path().join("destino final");
		let conversion = ConversionOptions {
			target_language: "python".to_string(),
			provider: "passthrough".to_string(),
			api_key: None
		};
		let skip = vec!["*.png".to_string()];
		let report = process_files(
			BatchJob {
				source: &source,
				output: &output,
				simplification: SimplificationOptions {
					remove_comments: true,
					..Default::default()
				},
				conversion: &conversion,
				skip_patterns: &skip
			},
			&OfflineConverter
		).await.expect("batch");
		assert_eq!(report.skipped, 1);
		assert_eq!(report.processed_files.len(), 2);
		assert_eq!(report.converted_files.len(), 2);
		assert!(report.failures.is_empty());
		let main = std::fs::read_to_string(output.join("main.py")).expect("main.py");
		assert_eq!(main, "\nconst a = 1;\n");
		assert!(output.join("lib/util.py").is_file());
	}
}
