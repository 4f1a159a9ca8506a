use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
pub struct Request {
	#[serde(default)]
	pub id: Option<Value>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
	pub jsonrpc: &'static str,
	pub id: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
	pub code: i64,
	pub message: String,
}

impl Response {
	pub fn ok(id: Value, result: Value) -> Self {
		Self {
			jsonrpc: "2.0",
			id,
			result: Some(result),
			error: None
		}
	}
	pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
		Self {
			jsonrpc: "2.0",
			id,
			result: None,
			error: Some(ErrorObject {
				code,
				message: message.into()
			})
		}
	}
}

/// Structured failure reported through the JSON-RPC `error` member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
	pub code: i64,
	pub message: String,
}

impl ProtocolError {
	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into()
		}
	}
	pub fn method_not_found(message: impl Into<String>) -> Self {
		Self::new(METHOD_NOT_FOUND, message)
	}
	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(INTERNAL_ERROR, message)
	}
	pub fn invalid_params(message: impl Into<String>) -> Self {
		Self::new(INVALID_PARAMS, message)
	}
}

impl std::fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for ProtocolError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
	Text {
		text: String
	},
}

/// Uniform envelope returned by every tool, success or described failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
	pub content: Vec<Content>,
	#[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
	pub is_error: bool,
}

impl ToolCallResult {
	pub fn text(text: impl Into<String>) -> Self {
		Self {
			content: vec![Content::Text {
				text: text.into()
			}],
			is_error: false
		}
	}
	pub fn error(text: impl Into<String>) -> Self {
		Self {
			content: vec![Content::Text {
				text: text.into()
			}],
			is_error: true
		}
	}
	pub fn first_text(&self) -> &str {
		match self.content.first() {
			Some(Content::Text { text }) => text,
			None => "",
		}
	}
}
