use crate::pipeline::{ConversionOptions, SimplificationOptions};
use crate::tier::{self, Tier};
use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
	ListFilesInFolder,
	ReadFileContent,
	SearchFilesByExtension,
	GetAllFoldersContext,
	GetLocalFilesInfo,
	FormatContextForAi,
	CreateFileInDestination,
	ModifyFileInDestination,
	DeleteFileInDestination,
	GetFileStatistics,
	ValidateMcpStructure,
	ExportMcpConfig,
	SimplifyCode,
	ProcessFiles,
	RunMcpDemo,
	BuildMcpServer,
	TestMcpIntegration,
}

impl ToolKind {
	pub const ALL: [ToolKind; 17] = [
		ToolKind::ListFilesInFolder,
		ToolKind::ReadFileContent,
		ToolKind::SearchFilesByExtension,
		ToolKind::GetAllFoldersContext,
		ToolKind::GetLocalFilesInfo,
		ToolKind::FormatContextForAi,
		ToolKind::CreateFileInDestination,
		ToolKind::ModifyFileInDestination,
		ToolKind::DeleteFileInDestination,
		ToolKind::GetFileStatistics,
		ToolKind::ValidateMcpStructure,
		ToolKind::ExportMcpConfig,
		ToolKind::SimplifyCode,
		ToolKind::ProcessFiles,
		ToolKind::RunMcpDemo,
		ToolKind::BuildMcpServer,
		ToolKind::TestMcpIntegration,
	];

	pub fn name(self) -> &'static str {
		match self {
			ToolKind::ListFilesInFolder => "list_files_in_folder",
			ToolKind::ReadFileContent => "read_file_content",
			ToolKind::SearchFilesByExtension => "search_files_by_extension",
			ToolKind::GetAllFoldersContext => "get_all_folders_context",
			ToolKind::GetLocalFilesInfo => "get_local_files_info",
			ToolKind::FormatContextForAi => "format_context_for_ai",
			ToolKind::CreateFileInDestination => "create_file_in_destination",
			ToolKind::ModifyFileInDestination => "modify_file_in_destination",
			ToolKind::DeleteFileInDestination => "delete_file_in_destination",
			ToolKind::GetFileStatistics => "get_file_statistics",
			ToolKind::ValidateMcpStructure => "validate_mcp_structure",
			ToolKind::ExportMcpConfig => "export_mcp_config",
			ToolKind::SimplifyCode => "simplify_code",
			ToolKind::ProcessFiles => "process_files",
			ToolKind::RunMcpDemo => "run_mcp_demo",
			ToolKind::BuildMcpServer => "build_mcp_server",
			ToolKind::TestMcpIntegration => "test_mcp_integration",
		}
	}

	pub fn from_name(name: &str) -> Option<ToolKind> {
		let kind = match name {
			"list_files_in_folder" => ToolKind::ListFilesInFolder,
			"read_file_content" => ToolKind::ReadFileContent,
			"search_files_by_extension" => ToolKind::SearchFilesByExtension,
			"get_all_folders_context" => ToolKind::GetAllFoldersContext,
			"get_local_files_info" => ToolKind::GetLocalFilesInfo,
			"format_context_for_ai" => ToolKind::FormatContextForAi,
			"create_file_in_destination" => ToolKind::CreateFileInDestination,
			"modify_file_in_destination" => ToolKind::ModifyFileInDestination,
			"delete_file_in_destination" => ToolKind::DeleteFileInDestination,
			"get_file_statistics" => ToolKind::GetFileStatistics,
			"validate_mcp_structure" => ToolKind::ValidateMcpStructure,
			"export_mcp_config" => ToolKind::ExportMcpConfig,
			"simplify_code" => ToolKind::SimplifyCode,
			"process_files" => ToolKind::ProcessFiles,
			"run_mcp_demo" => ToolKind::RunMcpDemo,
			"build_mcp_server" => ToolKind::BuildMcpServer,
			"test_mcp_integration" => ToolKind::TestMcpIntegration,
			_ => return None,
		};
		Some(kind)
	}

	pub fn descriptor(self) -> Value {
		let (description, schema) = match self {
			ToolKind::ListFilesInFolder => (
				"List the files and directories directly inside one of the MCP folders.",
				object_schema(
					json!({
						"folderName": tier_property("Folder to list.", &tier::folder_names()),
						"basePath": base_path_property()
					}),
					&["folderName"]
				)
			),
			ToolKind::ReadFileContent => (
				"Read the full text of a file inside the MCP folders. Relative paths resolve against the base path.",
				object_schema(
					json!({
						"filePath": {
							"type": "string",
							"description": "Path of the file, e.g. \"primaria/main.js\"."
						},
						"basePath": base_path_property()
					}),
					&["filePath"]
				)
			),
			ToolKind::SearchFilesByExtension => (
				"Find files whose name ends with the given extension in every MCP folder.",
				object_schema(
					json!({
						"extension": {
							"type": "string",
							"description": "Suffix to match, e.g. \".js\"."
						},
						"basePath": base_path_property()
					}),
					&["extension"]
				)
			),
			ToolKind::GetAllFoldersContext => (
				"Return the listing of all three MCP folders, optionally with truncated file contents.",
				object_schema(
					json!({
						"includeContent": {
							"type": "boolean",
							"default": true,
							"description": "Include file contents."
						},
						"maxContentLength": max_content_property(),
						"basePath": base_path_property()
					}),
					&[]
				)
			),
			ToolKind::GetLocalFilesInfo => (
				"Human-readable report of the files in each MCP folder with short previews of small code files.",
				object_schema(
					json!({
						"basePath": base_path_property()
					}),
					&[]
				)
			),
			ToolKind::FormatContextForAi => (
				"Render the three MCP folders as a prompt-ready context block.",
				object_schema(
					json!({
						"includeContent": {
							"type": "boolean",
							"default": true,
							"description": "Include file contents."
						},
						"maxContentLength": max_content_property(),
						"basePath": base_path_property()
					}),
					&[]
				)
			),
			ToolKind::CreateFileInDestination => (
				"Create or overwrite a file in the destino final folder.",
				object_schema(
					json!({
						"fileName": file_name_property(),
						"content": {
							"type": "string",
							"description": "Text to write."
						}
					}),
					&["fileName", "content"]
				)
			),
			ToolKind::ModifyFileInDestination => (
				"Replace the content of an existing file in the destino final folder.",
				object_schema(
					json!({
						"fileName": file_name_property(),
						"content": {
							"type": "string",
							"description": "New content."
						}
					}),
					&["fileName", "content"]
				)
			),
			ToolKind::DeleteFileInDestination => (
				"Delete a file from the destino final folder.",
				object_schema(
					json!({
						"fileName": file_name_property()
					}),
					&["fileName"]
				)
			),
			ToolKind::GetFileStatistics => (
				"File counts, sizes and modification times per MCP folder.",
				object_schema(
					json!({
						"folderName": tier_property("Restrict to one folder; all folders when omitted.", &tier::folder_names()),
						"includeSize": {
							"type": "boolean",
							"default": true,
							"description": "Include byte sizes."
						},
						"basePath": base_path_property()
					}),
					&[]
				)
			),
			ToolKind::ValidateMcpStructure => (
				"Check that the three MCP folders exist, optionally creating the missing ones.",
				object_schema(
					json!({
						"basePath": base_path_property(),
						"createMissing": {
							"type": "boolean",
							"default": false,
							"description": "Create missing folders."
						}
					}),
					&[]
				)
			),
			ToolKind::ExportMcpConfig => (
				"Write the folder layout and capability map as JSON.",
				object_schema(
					json!({
						"outputPath": {
							"type": "string",
							"description": "Output file; defaults to the configured export path."
						},
						"includeSecrets": {
							"type": "boolean",
							"default": false,
							"description": "Reserved; no secrets are exported."
						}
					}),
					&[]
				)
			),
			ToolKind::SimplifyCode => (
				"Shrink source code by removing comments, shortening keywords and minifying whitespace.",
				object_schema(
					json!({
						"code": {
							"type": "string",
							"description": "Source code."
						},
						"options": simplification_property(),
						"fileExtension": {
							"type": "string",
							"description": "Source extension; detected from the code when omitted."
						}
					}),
					&["code"]
				)
			),
			ToolKind::ProcessFiles => (
				"Simplify and convert every file of a source folder, writing the results to destino final.",
				object_schema(
					json!({
						"sourceFolder": {
							"type": "string",
							"enum": tier::folder_names(),
							"default": Tier::Primaria.folder_name(),
							"description": "Folder to read from."
						},
						"outputFolder": {
							"type": "string",
							"enum": tier::writable_folder_names(),
							"default": Tier::DestinoFinal.folder_name(),
							"description": "Folder to write to."
						},
						"simplificationOptions": simplification_property(),
						"conversionOptions": {
							"type": "object",
							"properties": {
								"targetLanguage": {
									"type": "string",
									"description": "Language to convert to, e.g. \"python\"."
								},
								"provider": {
									"type": "string",
									"default": "passthrough",
									"description": "Conversion provider."
								},
								"apiKey": {
									"type": "string",
									"description": "Provider credential."
								}
							},
							"required": ["targetLanguage"]
						}
					}),
					&["conversionOptions"]
				)
			),
			ToolKind::RunMcpDemo => (
				"Run the demo against the MCP folders.",
				object_schema(json!({}), &[])
			),
			ToolKind::BuildMcpServer => (
				"Run the configured build command in the base path.",
				object_schema(json!({}), &[])
			),
			ToolKind::TestMcpIntegration => (
				"Run the configured integration test command in the base path.",
				object_schema(json!({}), &[])
			),
		};
		json!({
			"name": self.name(),
			"description": description,
			"inputSchema": schema
		})
	}
}

pub fn list_tools() -> Vec<Value> {
	ToolKind::ALL
		.iter()
		.map(|kind| kind.descriptor())
		.collect()
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
	let mut schema = json!({
		"type": "object",
		"properties": properties
	});
	if !required.is_empty() {
		schema["required"] = json!(required);
	}
	schema
}

fn tier_property(description: &str, folders: &[&str]) -> Value {
	json!({
		"type": "string",
		"enum": folders,
		"description": description
	})
}

fn base_path_property() -> Value {
	json!({
		"type": "string",
		"description": "Base directory holding the MCP folders; defaults to the server's base path."
	})
}

fn file_name_property() -> Value {
	json!({
		"type": "string",
		"description": "Plain file name inside destino final, without directories."
	})
}

fn max_content_property() -> Value {
	json!({
		"type": "integer",
		"minimum": 0,
		"description": "Characters kept per file; defaults to the server setting."
	})
}

fn simplification_property() -> Value {
	json!({
		"type": "object",
		"properties": {
			"removeComments": { "type": "boolean", "default": false },
			"reduceKeywords": { "type": "boolean", "default": false },
			"minify": { "type": "boolean", "default": false }
		}
	})
}

fn default_true() -> bool {
	true
}

fn default_source() -> Tier {
	Tier::Primaria
}

fn default_output() -> Tier {
	Tier::DestinoFinal
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderArgs {
	pub folder_name: Tier,
	#[serde(default)]
	pub base_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileArgs {
	pub file_path: String,
	#[serde(default)]
	pub base_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionArgs {
	pub extension: String,
	#[serde(default)]
	pub base_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextArgs {
	#[serde(default = "default_true")]
	pub include_content: bool,
	#[serde(default)]
	pub max_content_length: Option<usize>,
	#[serde(default)]
	pub base_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseArgs {
	#[serde(default)]
	pub base_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileArgs {
	pub file_name: String,
	pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameArgs {
	pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsArgs {
	#[serde(default)]
	pub folder_name: Option<Tier>,
	#[serde(default = "default_true")]
	pub include_size: bool,
	#[serde(default)]
	pub base_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateArgs {
	#[serde(default)]
	pub base_path: Option<String>,
	#[serde(default)]
	pub create_missing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArgs {
	#[serde(default)]
	pub output_path: Option<String>,
	#[serde(default)]
	pub include_secrets: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifyArgs {
	pub code: String,
	#[serde(default)]
	pub options: SimplificationOptions,
	#[serde(default)]
	pub file_extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessArgs {
	#[serde(default = "default_source")]
	pub source_folder: Tier,
	#[serde(default = "default_output")]
	pub output_folder: Tier,
	#[serde(default)]
	pub simplification_options: SimplificationOptions,
	pub conversion_options: ConversionOptions,
}

/// A tool invocation with its arguments decoded.
#[derive(Debug, Clone)]
pub enum ToolCall {
	ListFilesInFolder(FolderArgs),
	ReadFileContent(ReadFileArgs),
	SearchFilesByExtension(ExtensionArgs),
	GetAllFoldersContext(ContextArgs),
	GetLocalFilesInfo(BaseArgs),
	FormatContextForAi(ContextArgs),
	CreateFileInDestination(WriteFileArgs),
	ModifyFileInDestination(WriteFileArgs),
	DeleteFileInDestination(FileNameArgs),
	GetFileStatistics(StatisticsArgs),
	ValidateMcpStructure(ValidateArgs),
	ExportMcpConfig(ExportArgs),
	SimplifyCode(SimplifyArgs),
	ProcessFiles(ProcessArgs),
	RunMcpDemo,
	BuildMcpServer,
	TestMcpIntegration,
}

fn decode<T: DeserializeOwned>(kind: ToolKind, arguments: &Value) -> Result<T> {
	let arguments = if arguments.is_null() {
		json!({})
	}
	else {
		arguments.clone()
	};
	serde_json::from_value(arguments).map_err(|err| anyhow!("invalid arguments for {}: {}", kind.name(), err))
}

impl ToolCall {
	pub fn decode(kind: ToolKind, arguments: &Value) -> Result<ToolCall> {
		let call = match kind {
			ToolKind::ListFilesInFolder => ToolCall::ListFilesInFolder(decode(kind, arguments)?),
			ToolKind::ReadFileContent => ToolCall::ReadFileContent(decode(kind, arguments)?),
			ToolKind::SearchFilesByExtension => ToolCall::SearchFilesByExtension(decode(kind, arguments)?),
			ToolKind::GetAllFoldersContext => ToolCall::GetAllFoldersContext(decode(kind, arguments)?),
			ToolKind::GetLocalFilesInfo => ToolCall::GetLocalFilesInfo(decode(kind, arguments)?),
			ToolKind::FormatContextForAi => ToolCall::FormatContextForAi(decode(kind, arguments)?),
			ToolKind::CreateFileInDestination => ToolCall::CreateFileInDestination(decode(kind, arguments)?),
			ToolKind::ModifyFileInDestination => ToolCall::ModifyFileInDestination(decode(kind, arguments)?),
			ToolKind::DeleteFileInDestination => ToolCall::DeleteFileInDestination(decode(kind, arguments)?),
			ToolKind::GetFileStatistics => ToolCall::GetFileStatistics(decode(kind, arguments)?),
			ToolKind::ValidateMcpStructure => ToolCall::ValidateMcpStructure(decode(kind, arguments)?),
			ToolKind::ExportMcpConfig => ToolCall::ExportMcpConfig(decode(kind, arguments)?),
			ToolKind::SimplifyCode => ToolCall::SimplifyCode(decode(kind, arguments)?),
			ToolKind::ProcessFiles => ToolCall::ProcessFiles(decode(kind, arguments)?),
			ToolKind::RunMcpDemo => ToolCall::RunMcpDemo,
			ToolKind::BuildMcpServer => ToolCall::BuildMcpServer,
			ToolKind::TestMcpIntegration => ToolCall::TestMcpIntegration,
		};
		Ok(call)
	}
}
