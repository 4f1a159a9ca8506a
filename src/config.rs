use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 2000;

const DEFAULT_SKIP_PATTERNS: [&str; 7] = ["*.exe", "*.dll", "*.obj", "*.bin", "*.jpg", "*.png", "*.gif"];

#[derive(Clone, Debug)]
pub struct Config {
	pub base_path: PathBuf,
	pub max_content_length: usize,
	pub export_path: Option<PathBuf>,
	pub demo_command: Option<Vec<String>>,
	pub build_command: Vec<String>,
	pub test_command: Vec<String>,
	pub skip_patterns: Vec<String>,
	pub otel_enabled: bool,
	pub otel_endpoint: String,
	pub otel_service_name: String,
	pub session_id: String,
}

impl Config {
	pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
		Self {
			base_path: base_path.into(),
			max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
			export_path: None,
			demo_command: None,
			build_command: split_command("cargo build --release"),
			test_command: split_command("cargo test"),
			skip_patterns: DEFAULT_SKIP_PATTERNS
				.iter()
				.map(|value| value.to_string())
				.collect(),
			otel_enabled: false,
			otel_endpoint: String::from("http://127.0.0.1:4317"),
			otel_service_name: String::from("mcp-tiers"),
			session_id: uuid::Uuid::new_v4().to_string(),
		}
	}

	/// Read-side tools may name another base; relative overrides resolve against the configured one.
	pub fn resolve_base(&self, override_path: Option<&str>) -> PathBuf {
		match override_path.map(str::trim) {
			Some(path) if !path.is_empty() => self.base_path.join(path),
			_ => self.base_path.clone(),
		}
	}

	pub fn resolved_export_path(&self) -> PathBuf {
		self.export_path
			.clone()
			.unwrap_or_else(|| self.base_path.join("mcp-config.json"))
	}
}

pub fn load_config() -> Result<Config> {
	let mut base_path: Option<String> = None;
	let mut max_content_length: Option<usize> = None;
	let mut export_path: Option<String> = None;
	let mut demo_command: Option<String> = None;
	let mut build_command: Option<String> = None;
	let mut test_command: Option<String> = None;
	let mut skip_patterns: Vec<String> = Vec::new();
	let mut otel_enabled: Option<bool> = None;
	let mut otel_endpoint: Option<String> = None;
	let mut otel_service_name: Option<String> = None;
	let mut config_path: Option<String> = None;
	let mut print_schema = false;
	let mut args = std::env::args().skip(1);
	while let Some(arg) = args.next() {
		match arg.as_str() {
			"--base-path" => {
				let value = args.next().ok_or_else(|| anyhow!("--base-path requires a value"))?;
				base_path = Some(value);
			}
			"--max-content-length" => {
				let value = args.next().ok_or_else(|| anyhow!("--max-content-length requires a value"))?;
				max_content_length = Some(parse_usize(&value, "--max-content-length")?);
			}
			"--export-path" => {
				let value = args.next().ok_or_else(|| anyhow!("--export-path requires a value"))?;
				export_path = Some(value);
			}
			"--demo-command" => {
				let value = args.next().ok_or_else(|| anyhow!("--demo-command requires a value"))?;
				demo_command = Some(value);
			}
			"--build-command" => {
				let value = args.next().ok_or_else(|| anyhow!("--build-command requires a value"))?;
				build_command = Some(value);
			}
			"--test-command" => {
				let value = args.next().ok_or_else(|| anyhow!("--test-command requires a value"))?;
				test_command = Some(value);
			}
			"--skip-pattern" => {
				let value = args.next().ok_or_else(|| anyhow!("--skip-pattern requires a value"))?;
				if !value.trim().is_empty() {
					skip_patterns.push(value);
				}
			}
			"--config" => {
				let value = args.next().ok_or_else(|| anyhow!("--config requires a value"))?;
				config_path = Some(value);
			}
			"--print-config-schema" => {
				print_schema = true;
			}
			"--otel-enabled" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-enabled requires a value"))?;
				otel_enabled = Some(parse_bool(&value, "--otel-enabled")?);
			}
			"--otel-endpoint" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-endpoint requires a value"))?;
				otel_endpoint = Some(value);
			}
			"--otel-service-name" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-service-name requires a value"))?;
				otel_service_name = Some(value);
			}
			_ => return Err(anyhow!("unknown argument: {}", arg)),
		}
	}
	if print_schema {
		let payload = serde_json::to_string_pretty(&config_schema())?;
		println!("{}", payload);
		std::process::exit(0);
	}
	base_path = base_path.or_else(|| env_value("MCP_BASE_PATH"));
	config_path = config_path.or_else(|| env_value("MCP_CONFIG"));
	export_path = export_path.or_else(|| env_value("MCP_EXPORT_PATH"));
	demo_command = demo_command.or_else(|| env_value("MCP_DEMO_COMMAND"));
	build_command = build_command.or_else(|| env_value("MCP_BUILD_COMMAND"));
	test_command = test_command.or_else(|| env_value("MCP_TEST_COMMAND"));
	otel_endpoint = otel_endpoint.or_else(|| env_value("MCP_OTEL_ENDPOINT"));
	otel_service_name = otel_service_name.or_else(|| env_value("MCP_OTEL_SERVICE_NAME"));
	if max_content_length.is_none() {
		if let Some(value) = env_value("MCP_MAX_CONTENT_LENGTH") {
			max_content_length = Some(parse_usize(&value, "MCP_MAX_CONTENT_LENGTH")?);
		}
	}
	if otel_enabled.is_none() {
		if let Some(value) = env_value("MCP_OTEL_ENABLED") {
			otel_enabled = Some(parse_bool(&value, "MCP_OTEL_ENABLED")?);
		}
	}
	if skip_patterns.is_empty() {
		if let Some(value) = env_value("MCP_SKIP_PATTERNS") {
			skip_patterns = value.split(',')
				.map(str::trim)
				.filter(|item| !item.is_empty())
				.map(|item| item.to_string())
				.collect();
		}
	}
	let cwd = std::env::current_dir()?;
	let base_path = match base_path {
		Some(path) => normalize_base(&path, &cwd),
		None => cwd.clone(),
	};
	let mut config = Config::with_base_path(base_path);
	if let Some(length) = max_content_length {
		config.max_content_length = length;
	}
	config.export_path = export_path.map(|path| normalize_base(&path, &cwd));
	config.demo_command = demo_command
		.map(|value| split_command(&value))
		.filter(|parts| !parts.is_empty());
	if let Some(value) = build_command {
		config.build_command = split_command(&value);
	}
	if let Some(value) = test_command {
		config.test_command = split_command(&value);
	}
	if !skip_patterns.is_empty() {
		config.skip_patterns = skip_patterns;
	}
	if let Some(enabled) = otel_enabled {
		config.otel_enabled = enabled;
	}
	if let Some(endpoint) = otel_endpoint {
		config.otel_endpoint = endpoint;
	}
	if let Some(service) = otel_service_name {
		config.otel_service_name = service;
	}
	if let Some(path) = config_path {
		let override_value = load_config_value(&path)?;
		return apply_config_override(config, &override_value, &cwd);
	}
	Ok(config)
}

pub fn config_schema() -> Value {
	json!({
		"$schema": "http://json-schema.org/draft-07/schema#",
		"title": "mcp-tiers configuration",
		"type": "object",
		"additionalProperties": false,
		"properties": {
			"base_path": {
				"type": "string",
				"description": "Directory holding the primaria, intermediario and destino final folders."
			},
			"max_content_length": {
				"type": "integer",
				"minimum": 0,
				"description": "Default number of characters kept per file in folder context results."
			},
			"export_path": {
				"type": "string",
				"description": "Default output path for export_mcp_config."
			},
			"demo_command": {
				"type": ["string", "null"],
				"description": "Command run by run_mcp_demo. Null runs the built-in demo."
			},
			"build_command": {
				"type": "string",
				"description": "Command run by build_mcp_server."
			},
			"test_command": {
				"type": "string",
				"description": "Command run by test_mcp_integration."
			},
			"skip_patterns": {
				"type": "array",
				"items": { "type": "string" },
				"description": "Glob patterns of file names skipped by process_files."
			},
			"otel_enabled": {
				"type": "boolean",
				"description": "Enable OTLP trace export.",
				"scope": "configuration"
			},
			"otel_endpoint": {
				"type": "string",
				"description": "OTLP endpoint.",
				"scope": "configuration"
			},
			"otel_service_name": {
				"type": "string",
				"description": "OTEL service.name.",
				"scope": "configuration"
			}
		}
	})
}

fn load_config_value(path: &str) -> Result<Value> {
	let content = std::fs::read_to_string(path)
		.map_err(|err| anyhow!("failed to read config {}: {}", path, err))?;
	let value: Value = serde_json::from_str(&content)
		.map_err(|err| anyhow!("failed to parse config {}: {}", path, err))?;
	Ok(value)
}

pub fn apply_config_override(base: Config, value: &Value, cwd: &Path) -> Result<Config> {
	let obj = value.as_object().ok_or_else(|| anyhow!("config must be an object"))?;
	let mut next = base;
	for (key, value) in obj {
		match key.as_str() {
			"base_path" => {
				let path = value.as_str().ok_or_else(|| anyhow!("base_path must be a string"))?;
				next.base_path = normalize_base(path, cwd);
			}
			"max_content_length" => {
				let length = value.as_u64().ok_or_else(|| anyhow!("max_content_length must be a non-negative integer"))?;
				next.max_content_length = length as usize;
			}
			"export_path" => {
				next.export_path = match value {
					Value::Null => None,
					Value::String(path) => Some(normalize_base(path, cwd)),
					_ => return Err(anyhow!("export_path must be a string")),
				};
			}
			"demo_command" => {
				next.demo_command = match value {
					Value::Null => None,
					Value::String(command) => Some(split_command(command)).filter(|parts| !parts.is_empty()),
					_ => return Err(anyhow!("demo_command must be a string or null")),
				};
			}
			"build_command" => {
				let command = value.as_str().ok_or_else(|| anyhow!("build_command must be a string"))?;
				next.build_command = split_command(command);
			}
			"test_command" => {
				let command = value.as_str().ok_or_else(|| anyhow!("test_command must be a string"))?;
				next.test_command = split_command(command);
			}
			"skip_patterns" => {
				let items = value.as_array().ok_or_else(|| anyhow!("skip_patterns must be an array"))?;
				next.skip_patterns = items.iter()
					.map(|item| {
						item.as_str()
							.map(|text| text.to_string())
							.ok_or_else(|| anyhow!("skip_patterns must contain strings"))
					})
					.collect::<Result<Vec<_>>>()?;
			}
			"otel_enabled" => {
				if !value.is_null() {
					next.otel_enabled = value.as_bool().ok_or_else(|| anyhow!("otel_enabled must be a boolean"))?;
				}
			}
			"otel_endpoint" => {
				if !value.is_null() {
					next.otel_endpoint = value.as_str().ok_or_else(|| anyhow!("otel_endpoint must be a string"))?.to_string();
				}
			}
			"otel_service_name" => {
				if !value.is_null() {
					next.otel_service_name = value.as_str().ok_or_else(|| anyhow!("otel_service_name must be a string"))?.to_string();
				}
			}
			_ => return Err(anyhow!("unknown config key: {}", key)),
		}
	}
	Ok(next)
}

fn env_value(key: &str) -> Option<String> {
	std::env::var(key)
		.ok()
		.filter(|value| !value.trim().is_empty())
}

fn normalize_base(path: &str, cwd: &Path) -> PathBuf {
	let candidate = Path::new(path);
	if candidate.is_absolute() {
		candidate.to_path_buf()
	}
	else {
		cwd.join(candidate)
	}
}

pub fn split_command(value: &str) -> Vec<String> {
	value.split_whitespace()
		.map(|part| part.to_string())
		.collect()
}

fn parse_usize(value: &str, label: &str) -> Result<usize> {
	value.trim().parse::<usize>().map_err(|_| anyhow!("{} must be a non-negative integer", label))
}

fn parse_bool(value: &str, label: &str) -> Result<bool> {
	let value = value.trim().to_lowercase();
	match value.as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(anyhow!("{} must be a boolean", label)),
	}
}
