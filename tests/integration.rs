use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

struct RpcClient {
	child: Child,
	stdin: ChildStdin,
	stdout: BufReader<ChildStdout>,
	next_id: u64,
}

impl RpcClient {
	fn spawn(base: &Path) -> Self {
		Self::spawn_with(base, &[])
	}

	fn spawn_with(base: &Path, extra: &[&str]) -> Self {
		let bin = env!("CARGO_BIN_EXE_mcp-tiers");
		let mut child = Command::new(bin)
			.arg("--base-path")
			.arg(base)
			.args(extra)
			.env_remove("MCP_CONFIG")
			.env_remove("MCP_SKIP_PATTERNS")
			.env("RUST_LOG", "warn")
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.spawn()
			.expect("spawn mcp-tiers");
		let stdin = child.stdin
			.take()
			.expect("stdin");
		let stdout = child.stdout
			.take()
			.expect("stdout");
		Self {
			child,
			stdin,
			stdout: BufReader::new(stdout),
			next_id: 1
		}
	}

	fn send(&mut self, method: &str, params: Value) -> Value {
		let id = self.next_id;
		self.next_id += 1;
		let req = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params
		});
		let line = serde_json::to_string(&req).expect("serialize request");
		writeln!(self.stdin, "{}", line).expect("write request");
		self.stdin
			.flush()
			.expect("flush request");
		let mut resp_line = String::new();
		loop {
			resp_line.clear();
			let bytes = self.stdout
				.read_line(&mut resp_line)
				.expect("read response");
			if bytes == 0 {
				panic!("mcp-tiers exited unexpectedly");
			}
			let trimmed = resp_line.trim();
			if trimmed.is_empty() {
				continue;
			}
			let parsed: Value = match serde_json::from_str(trimmed) {
				Ok(value) => value,
				Err(_) => continue,
			};
			if parsed.get("id").and_then(Value::as_u64) == Some(id) {
				return parsed;
			}
		}
	}

	fn call(&mut self, name: &str, arguments: Value) -> Value {
		self.send("tools/call", json!({
			"name": name,
			"arguments": arguments
		}))
	}

	fn call_text(&mut self, name: &str, arguments: Value) -> String {
		let resp = self.call(name, arguments);
		let result = resp.get("result").unwrap_or_else(|| panic!("{} returned {}", name, resp));
		text_of(result)
	}
}

impl Drop for RpcClient {
	fn drop(&mut self) {
		let _ = self.child.kill();
		let _ = self.child.wait();
	}
}

fn text_of(result: &Value) -> String {
	result.get("content")
		.and_then(|content| content.get(0))
		.and_then(|item| item.get("text"))
		.and_then(Value::as_str)
		.expect("text content")
		.to_string()
}

fn json_payload(text: &str) -> Value {
	let start = text.find(['[', '{']).expect("json payload");
	let end = text.rfind([']', '}']).expect("json payload end");
	serde_json::from_str(&text[start..=end]).expect("parse payload")
}

fn write_text(path: &Path, contents: &str) {
	std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
	std::fs::write(path, contents).expect("write file");
}

#[test]
fn tools_list_exposes_every_tool() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let init = client.send("initialize", json!({}));
	assert_eq!(init["result"]["serverInfo"]["name"], "mcp-tiers");
	let resp = client.send("tools/list", json!({}));
	let tools = resp["result"]["tools"].as_array().expect("tools");
	assert_eq!(tools.len(), 17);
	let names: Vec<&str> = tools.iter()
		.filter_map(|tool| tool["name"].as_str())
		.collect();
	for expected in ["list_files_in_folder", "create_file_in_destination", "process_files", "test_mcp_integration"] {
		assert!(names.contains(&expected), "missing {}", expected);
	}
}

#[test]
fn validate_creates_missing_folders_then_reports_exists() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let text = client.call_text("validate_mcp_structure", json!({ "createMissing": true }));
	let report = json_payload(&text);
	let statuses: Vec<&str> = report["folders"].as_array()
		.expect("folders")
		.iter()
		.filter_map(|check| check["status"].as_str())
		.collect();
	assert_eq!(statuses, vec!["created", "created", "created"]);
	for folder in ["primaria", "intermediario", "destino final"] {
		assert!(base.path().join(folder).is_dir());
	}
	let text = client.call_text("validate_mcp_structure", json!({ "createMissing": true }));
	let report = json_payload(&text);
	assert!(report["folders"].as_array()
		.expect("folders")
		.iter()
		.all(|check| check["status"] == "exists"));
	assert_eq!(report["valid"], true);
}

#[test]
fn validate_without_create_does_not_mutate() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let text = client.call_text("validate_mcp_structure", json!({}));
	let report = json_payload(&text);
	assert_eq!(report["valid"], false);
	assert!(!base.path().join("primaria").exists());
}

#[test]
fn create_then_read_and_overwrite() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let created = client.call("create_file_in_destination", json!({ "fileName": "a.txt", "content": "hello" }));
	assert!(created["result"].get("isError").is_none());
	let text = client.call_text("read_file_content", json!({ "filePath": "destino final/a.txt" }));
	let (_, content) = text.split_once("\n\n").expect("content separator");
	assert_eq!(content, "hello");
	client.call_text("create_file_in_destination", json!({ "fileName": "a.txt", "content": "again" }));
	let text = client.call_text("read_file_content", json!({ "filePath": "destino final/a.txt" }));
	assert!(text.ends_with("\n\nagain"));
}

#[test]
fn modify_missing_file_does_not_create_it() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	client.call_text("validate_mcp_structure", json!({ "createMissing": true }));
	let text = client.call_text("modify_file_in_destination", json!({ "fileName": "missing.txt", "content": "x" }));
	assert!(text.starts_with("File not found in destino final"));
	let listing = client.call_text("list_files_in_folder", json!({ "folderName": "destino final" }));
	assert!(!listing.contains("missing.txt"));
}

#[test]
fn delete_twice_reports_not_found() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	client.call_text("create_file_in_destination", json!({ "fileName": "d.txt", "content": "bye" }));
	let first = client.call_text("delete_file_in_destination", json!({ "fileName": "d.txt" }));
	assert!(first.starts_with("File deleted from destino final"));
	assert!(!base.path().join("destino final/d.txt").exists());
	let second = client.call("delete_file_in_destination", json!({ "fileName": "d.txt" }));
	assert!(second.get("error").is_none());
	assert!(text_of(&second["result"]).starts_with("File not found in destino final"));
}

#[test]
fn destination_refuses_path_segments() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let resp = client.call("create_file_in_destination", json!({ "fileName": "../primaria/evil.txt", "content": "x" }));
	assert_eq!(resp["result"]["isError"], true);
	assert!(!base.path().join("primaria/evil.txt").exists());
}

#[test]
fn all_folders_context_counts_regular_files() {
	let base = tempfile::tempdir().expect("tempdir");
	write_text(&base.path().join("primaria/a.js"), "let a = 1;");
	write_text(&base.path().join("primaria/b.js"), "let b = 2;");
	std::fs::create_dir_all(base.path().join("primaria/lib")).expect("mkdir");
	write_text(&base.path().join("intermediario/c.txt"), "c");
	let mut client = RpcClient::spawn(base.path());
	let text = client.call_text("get_all_folders_context", json!({ "includeContent": false }));
	let contexts = json_payload(&text);
	let contexts = contexts.as_array().expect("contexts");
	assert_eq!(contexts.len(), 3);
	let names: Vec<&str> = contexts.iter()
		.filter_map(|context| context["folderName"].as_str())
		.collect();
	assert_eq!(names, vec!["primaria", "intermediario", "destino final"]);
	let totals: Vec<u64> = contexts.iter()
		.filter_map(|context| context["totalFiles"].as_u64())
		.collect();
	assert_eq!(totals, vec![2, 1, 0]);
}

#[test]
fn context_truncates_long_files() {
	let base = tempfile::tempdir().expect("tempdir");
	write_text(&base.path().join("primaria/long.txt"), &"x".repeat(100));
	let mut client = RpcClient::spawn(base.path());
	let text = client.call_text("get_all_folders_context", json!({ "maxContentLength": 10 }));
	let contexts = json_payload(&text);
	let content = contexts[0]["files"][0]["content"].as_str().expect("content");
	assert_eq!(content, format!("{}\n... [truncated]", "x".repeat(10)));
}

#[test]
fn unknown_tool_is_a_protocol_error() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let resp = client.call("nonexistent_tool", json!({}));
	assert!(resp.get("result").is_none());
	assert_eq!(resp["error"]["code"], -32601);
	assert_eq!(resp["error"]["message"], "Unknown tool: nonexistent_tool");
}

#[test]
fn handler_failure_is_an_internal_error_naming_the_tool() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let resp = client.call("modify_file_in_destination", json!({ "fileName": "a.txt" }));
	assert_eq!(resp["error"]["code"], -32603);
	let message = resp["error"]["message"].as_str().expect("message");
	assert!(message.starts_with("Error executing tool modify_file_in_destination:"));
	let next = client.send("ping", json!({}));
	assert_eq!(next["result"], json!({}));
}

#[test]
fn reads_outside_tier_folders_are_refused() {
	let base = tempfile::tempdir().expect("tempdir");
	write_text(&base.path().join("secret.txt"), "nope");
	let mut client = RpcClient::spawn(base.path());
	let resp = client.call("read_file_content", json!({ "filePath": "primaria/../secret.txt" }));
	assert_eq!(resp["result"]["isError"], true);
	assert!(text_of(&resp["result"]).starts_with("Access denied"));
}

#[test]
fn process_files_converts_into_destination() {
	let base = tempfile::tempdir().expect("tempdir");
	write_text(&base.path().join("primaria/main.js"), "// entry\nfunction main() { return 1; }\n");
	write_text(&base.path().join("primaria/util/helpers.js"), "const x = 2;\n");
	std::fs::write(base.path().join("primaria/logo.png"), [137u8, 80, 78, 71]).expect("write png");
	let mut client = RpcClient::spawn(base.path());
	let text = client.call_text("process_files", json!({
		"sourceFolder": "primaria",
		"outputFolder": "destino final",
		"simplificationOptions": { "removeComments": true },
		"conversionOptions": { "targetLanguage": "python", "provider": "passthrough" }
	}));
	assert!(text.starts_with("Processed 2 file(s) from primaria: 2 converted to python, 0 failed, 1 skipped."));
	let converted = std::fs::read_to_string(base.path().join("destino final/main.py")).expect("main.py");
	assert_eq!(converted, "\nfunction main() { return 1; }\n");
	assert!(base.path().join("destino final/util/helpers.py").is_file());
	assert!(!base.path().join("intermediario").exists());
}

#[test]
fn process_files_reports_unavailable_provider() {
	let base = tempfile::tempdir().expect("tempdir");
	write_text(&base.path().join("primaria/main.js"), "let a = 1;\n");
	let mut client = RpcClient::spawn(base.path());
	let resp = client.call("process_files", json!({
		"conversionOptions": { "targetLanguage": "python", "provider": "openai", "apiKey": "k" }
	}));
	assert_eq!(resp["result"]["isError"], true);
	assert!(text_of(&resp["result"]).contains("not available"));
	assert!(!base.path().join("destino final/main.py").exists());
}

#[test]
fn export_writes_capability_map() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	client.call_text("export_mcp_config", json!({ "outputPath": "out/config.json" }));
	let raw = std::fs::read_to_string(base.path().join("out/config.json")).expect("exported");
	let exported: Value = serde_json::from_str(&raw).expect("json");
	assert_eq!(exported["folders"], json!(["primaria", "intermediario", "destino final"]));
	assert_eq!(exported["capabilities"]["file_operations"]["delete"], json!(["destino final"]));
	assert!(exported["timestamp"].as_str().is_some());
}

#[test]
fn build_runs_configured_command() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn_with(base.path(), &["--build-command", "echo built"]);
	let text = client.call_text("build_mcp_server", json!({}));
	assert!(text.starts_with("MCP server build completed successfully."));
	assert!(text.contains("built"));
}

#[test]
fn simplify_code_reports_token_counts() {
	let base = tempfile::tempdir().expect("tempdir");
	let mut client = RpcClient::spawn(base.path());
	let text = client.call_text("simplify_code", json!({
		"code": "function add(a, b) {\n  return a + b; // sum\n}\n",
		"options": { "removeComments": true, "reduceKeywords": true, "minify": true }
	}));
	assert!(text.starts_with("Simplified code (.js, "));
	assert!(text.ends_with("fn add(a,b){r a + b;}"));
}
