use crate::config::{apply_config_override, config_schema, Config};
use crate::destination::Destination;
use crate::folders;
use crate::pipeline::{self, Converter};
use crate::protocol::{ProtocolError, Request, Response, ToolCallResult, INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};
use crate::scripts;
use crate::structure;
use crate::tools::{list_tools, ToolCall, ToolKind};
use anyhow::{anyhow, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_semantic_conventions::resource as semconv;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Maps tool names to handlers. Cloning shares the configuration and converter.
#[derive(Clone)]
pub struct Dispatcher {
	config: Arc<Config>,
	converter: Arc<dyn Converter>,
}

impl Dispatcher {
	pub fn new(config: Config, converter: Arc<dyn Converter>) -> Self {
		Self {
			config: Arc::new(config),
			converter
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	fn with_config(&self, config: Config) -> Self {
		Self {
			config: Arc::new(config),
			converter: self.converter.clone()
		}
	}

	pub async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolCallResult, ProtocolError> {
		let Some(kind) = ToolKind::from_name(name) else {
			warn!(tool = name, "unknown tool");
			return Err(ProtocolError::method_not_found(format!("Unknown tool: {}", name)));
		};
		let outcome = async {
			let call = ToolCall::decode(kind, arguments)?;
			self.execute(call).await
		}.await;
		outcome.map_err(|err| {
			warn!(tool = name, error = %err, "tool failed");
			ProtocolError::internal(format!("Error executing tool {}: {}", name, err))
		})
	}

	async fn execute(&self, call: ToolCall) -> Result<ToolCallResult> {
		let config = self.config.as_ref();
		match call {
			ToolCall::ListFilesInFolder(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				folders::list_files_in_folder(&base, args.folder_name).await
			}
			ToolCall::ReadFileContent(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				folders::read_file_content(&base, &args.file_path).await
			}
			ToolCall::SearchFilesByExtension(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				folders::search_files_by_extension(&base, &args.extension).await
			}
			ToolCall::GetAllFoldersContext(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				let max = args.max_content_length.unwrap_or(config.max_content_length);
				folders::all_folders_context_tool(&base, args.include_content, max).await
			}
			ToolCall::GetLocalFilesInfo(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				Ok(ToolCallResult::text(folders::get_local_files_info(&base).await))
			}
			ToolCall::FormatContextForAi(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				let max = args.max_content_length.unwrap_or(config.max_content_length);
				folders::format_context_tool(&base, args.include_content, max).await
			}
			ToolCall::CreateFileInDestination(args) => {
				Destination::new(&config.base_path).create_file(&args.file_name, &args.content).await
			}
			ToolCall::ModifyFileInDestination(args) => {
				Destination::new(&config.base_path).modify_file(&args.file_name, &args.content).await
			}
			ToolCall::DeleteFileInDestination(args) => {
				Destination::new(&config.base_path).delete_file(&args.file_name).await
			}
			ToolCall::GetFileStatistics(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				structure::get_file_statistics(&base, args.folder_name, args.include_size).await
			}
			ToolCall::ValidateMcpStructure(args) => {
				let base = config.resolve_base(args.base_path.as_deref());
				structure::validate_mcp_structure(&base, args.create_missing).await
			}
			ToolCall::ExportMcpConfig(args) => {
				let output = match args.output_path.as_deref().map(str::trim) {
					Some(path) if !path.is_empty() => config.base_path.join(path),
					_ => config.resolved_export_path(),
				};
				structure::export_mcp_config(&output, args.include_secrets).await
			}
			ToolCall::SimplifyCode(args) => Ok(pipeline::simplify_code_tool(
				&args.code,
				args.file_extension.as_deref(),
				args.options
			)),
			ToolCall::ProcessFiles(args) => {
				pipeline::process_files_tool(
					&config.base_path,
					args.source_folder,
					args.output_folder,
					args.simplification_options,
					&args.conversion_options,
					&config.skip_patterns,
					self.converter.as_ref()
				).await
			}
			ToolCall::RunMcpDemo => scripts::run_mcp_demo(&config.base_path, config.demo_command.as_deref()).await,
			ToolCall::BuildMcpServer => scripts::build_mcp_server(&config.base_path, &config.build_command).await,
			ToolCall::TestMcpIntegration => scripts::test_mcp_integration(&config.base_path, &config.test_command).await,
		}
	}
}

pub fn init_tracing(config: &Config) {
	let _ = global::set_error_handler(|_| {});
	let resource = Resource::new(
		vec![
		opentelemetry::KeyValue::new(semconv::SERVICE_NAME, config.otel_service_name.clone()),
		opentelemetry::KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
		opentelemetry::KeyValue::new("mcp.session_id", config.session_id.clone()),
		opentelemetry::KeyValue::new("mcp.base_path", config.base_path.display().to_string()),
		]
	);
	let tracing_layer = if config.otel_enabled {
		let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(config.otel_endpoint.clone());
		let provider = opentelemetry_otlp::new_pipeline()
			.tracing()
			.with_exporter(exporter)
			.with_trace_config(sdktrace::Config::default().with_resource(resource))
			.install_batch(opentelemetry_sdk::runtime::Tokio)
			.ok();
		if let Some(provider) = provider {
			let tracer = provider.tracer(config.otel_service_name.clone());
			global::set_tracer_provider(provider);
			Some(OpenTelemetryLayer::new(tracer))
		}
		else {
			None
		}
	}
	else {
		None
	};
	// stdout carries the protocol
	let fmt_layer = tracing_subscriber::fmt::layer()
		.with_writer(std::io::stderr)
		.with_target(false);
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
	if let Some(layer) = tracing_layer {
		subscriber.with(layer).init();
	}
	else {
		subscriber.init();
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
	Running,
	Stopped,
}

/// Owns a running transport loop. Dropping the handle also ends the loop.
pub struct ServerHandle {
	shutdown: Option<oneshot::Sender<()>>,
	task: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
	pub fn status(&self) -> ServerStatus {
		match &self.task {
			Some(task) if !task.is_finished() => ServerStatus::Running,
			_ => ServerStatus::Stopped,
		}
	}

	/// Signals the loop to stop reading and waits until it has released its streams.
	pub async fn stop(&mut self) -> Result<()> {
		if let Some(shutdown) = self.shutdown.take() {
			let _ = shutdown.send(());
		}
		self.join().await
	}

	/// Waits for the loop to end on its own, i.e. end of input.
	pub async fn wait(&mut self) -> Result<()> {
		self.join().await
	}

	async fn join(&mut self) -> Result<()> {
		let Some(task) = self.task.as_mut() else {
			return Ok(());
		};
		let joined = task.await;
		self.task = None;
		self.shutdown = None;
		joined.map_err(|err| anyhow!("server task failed: {}", err))?
	}
}

pub fn start<R, W>(config: Config, converter: Arc<dyn Converter>, reader: R, writer: W) -> ServerHandle
where
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static, {
	let (shutdown_tx, shutdown_rx) = oneshot::channel();
	let dispatcher = Dispatcher::new(config, converter);
	info!(
		base_path = %dispatcher.config().base_path.display(),
		session_id = %dispatcher.config().session_id,
		"starting MCP server"
	);
	let task = tokio::spawn(serve(dispatcher, reader, writer, shutdown_rx));
	ServerHandle {
		shutdown: Some(shutdown_tx),
		task: Some(task)
	}
}

pub async fn serve<R, W>(dispatcher: Dispatcher, reader: R, writer: W, mut shutdown: oneshot::Receiver<()>) -> Result<()>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin, {
	let mut reader = BufReader::new(reader);
	let mut writer = BufWriter::new(writer);
	let mut dispatcher = dispatcher;
	let mut frame = Vec::new();
	loop {
		// partial frames stay in `frame` if the shutdown branch wins
		let read = tokio::select! {
			_ = &mut shutdown => {
				debug!("shutdown requested");
				break;
			}
			read = reader.read_until(b'\n', &mut frame) => read?,
		};
		if read == 0 {
			debug!("input closed");
			break;
		}
		let line = match String::from_utf8(std::mem::take(&mut frame)) {
			Ok(line) => line,
			Err(err) => {
				let resp = Response::err(Value::Null, PARSE_ERROR, format!("invalid UTF-8 in request: {}", err));
				write_response(&mut writer, resp).await?;
				continue;
			}
		};
		if line.trim().is_empty() {
			continue;
		}
		let value: Value = match serde_json::from_str(&line) {
			Ok(value) => value,
			Err(err) => {
				let resp = Response::err(Value::Null, PARSE_ERROR, err.to_string());
				write_response(&mut writer, resp).await?;
				continue;
			}
		};
		let id = value.get("id").cloned();
		let req: Request = match serde_json::from_value(value) {
			Ok(req) => req,
			Err(err) => {
				let resp = Response::err(id.unwrap_or(Value::Null), INVALID_REQUEST, err.to_string());
				write_response(&mut writer, resp).await?;
				continue;
			}
		};
		if req.method == "initialize" {
			match apply_initialize_config(dispatcher.config(), &req) {
				Ok(Some(updated)) => dispatcher = dispatcher.with_config(updated),
				Ok(None) => {}
				Err(err) => {
					if let Some(id) = req.id.clone() {
						write_response(&mut writer, error_response(id, &err)).await?;
					}
					continue;
				}
			}
		}
		let Some(id) = req.id.clone() else {
			handle_notification(&dispatcher, req).await;
			continue;
		};
		let resp = handle_request(&dispatcher, id, req).await;
		write_response(&mut writer, resp).await?;
	}
	writer.flush().await?;
	info!("MCP server stopped");
	Ok(())
}

fn apply_initialize_config(config: &Config, req: &Request) -> Result<Option<Config>> {
	let Some(value) = req.params
		.get("capabilities")
		.and_then(|caps| caps.get("experimental"))
		.and_then(|exp| exp.get("configuration")) else {
		return Ok(None);
	};
	let cwd = std::env::current_dir()?;
	let updated = apply_config_override(config.clone(), value, &cwd)
		.map_err(|err| ProtocolError::invalid_params(err.to_string()))?;
	Ok(Some(updated))
}

async fn handle_notification(dispatcher: &Dispatcher, req: Request) {
	match req.method.as_str() {
		"notifications/initialized" | "notifications/cancelled" => debug!(method = %req.method, "notification"),
		_ => {
			if let Err(err) = route(dispatcher, &req).await {
				debug!(method = %req.method, error = %err, "notification failed");
			}
		}
	}
}

async fn handle_request(dispatcher: &Dispatcher, id: Value, req: Request) -> Response {
	let tool_name = extract_tool_name(&req.method, &req.params);
	let span = info_span!(
		"mcp.request",
		"mcp.session_id" = %dispatcher.config().session_id,
		"mcp.method" = %req.method,
		"mcp.tool_name" = tool_name.as_deref().unwrap_or(""),
		"mcp.base_path" = %dispatcher.config().base_path.display(),
		"mcp.is_error" = tracing::field::Empty,
		"mcp.error_code" = tracing::field::Empty,
		"mcp.response_bytes" = tracing::field::Empty,
	);
	let routed = route(dispatcher, &req).instrument(span.clone()).await;
	match routed {
		Ok(value) => {
			record_result(&span, &value);
			Response::ok(id, value)
		}
		Err(err) => {
			let resp = error_response(id, &err);
			if let Some(error) = &resp.error {
				span.record("mcp.error_code", error.code);
			}
			resp
		}
	}
}

fn error_response(id: Value, err: &anyhow::Error) -> Response {
	if let Some(protocol) = err.downcast_ref::<ProtocolError>() {
		Response::err(id, protocol.code, protocol.message.clone())
	}
	else {
		Response::err(id, INTERNAL_ERROR, err.to_string())
	}
}

async fn route(dispatcher: &Dispatcher, req: &Request) -> Result<Value> {
	match req.method.as_str() {
		"initialize" => Ok(json!({
			"protocolVersion": PROTOCOL_VERSION,
			"serverInfo": {
				"name": env!("CARGO_PKG_NAME"),
				"version": env!("CARGO_PKG_VERSION")
			},
			"configSchema": config_schema(),
			"capabilities": {
				"tools": {
					"listChanged": false
				}
			}
		})),
		"ping" => Ok(json!({})),
		"tools/list" => Ok(json!({
			"tools": list_tools()
		})),
		"tools/call" => {
			let name = req.params
				.get("name")
				.and_then(Value::as_str)
				.ok_or_else(|| ProtocolError::invalid_params("name is required"))?;
			let arguments = req.params
				.get("arguments")
				.cloned()
				.unwrap_or_else(|| json!({}));
			let result = dispatcher.call_tool(name, &arguments).await?;
			Ok(serde_json::to_value(result)?)
		}
		_ => Err(ProtocolError::method_not_found("method not found").into()),
	}
}

fn extract_tool_name(method: &str, params: &Value) -> Option<String> {
	if method != "tools/call" {
		return None;
	}
	params.get("name")
		.and_then(Value::as_str)
		.map(|value| value.to_string())
}

fn record_result(span: &Span, result: &Value) {
	let response_bytes = serde_json::to_string(result).map(|value| value.len() as u64).ok();
	if let Some(bytes) = response_bytes {
		span.record("mcp.response_bytes", bytes);
	}
	let is_error = result.get("isError")
		.and_then(Value::as_bool)
		.unwrap_or(false);
	span.record("mcp.is_error", is_error);
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, resp: Response) -> Result<()> {
	let line = serde_json::to_string(&resp)?;
	writer.write_all(line.as_bytes()).await?;
	writer.write_all(b"\n").await?;
	writer.flush().await?;
	Ok(())
}
