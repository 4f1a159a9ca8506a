use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One of the three fixed folders under the base path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
	#[serde(rename = "primaria")]
	Primaria,
	#[serde(rename = "intermediario")]
	Intermediario,
	#[serde(rename = "destino final")]
	DestinoFinal,
}

impl Tier {
	pub const ALL: [Tier; 3] = [Tier::Primaria, Tier::Intermediario, Tier::DestinoFinal];

	pub fn folder_name(self) -> &'static str {
		match self {
			Tier::Primaria => "primaria",
			Tier::Intermediario => "intermediario",
			Tier::DestinoFinal => "destino final",
		}
	}

	pub fn from_folder_name(name: &str) -> Option<Tier> {
		Tier::ALL
			.into_iter()
			.find(|tier| tier.folder_name() == name)
	}

	pub fn is_writable(self) -> bool {
		matches!(self, Tier::DestinoFinal)
	}

	pub fn role(self) -> &'static str {
		match self {
			Tier::Primaria => "source",
			Tier::Intermediario => "intermediate",
			Tier::DestinoFinal => "destination",
		}
	}

	pub fn capability_label(self) -> &'static str {
		if self.is_writable() {
			"read/write/create/delete"
		}
		else {
			"read-only"
		}
	}

	pub fn path(self, base: &Path) -> PathBuf {
		base.join(self.folder_name())
	}
}

impl std::fmt::Display for Tier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.folder_name())
	}
}

pub fn folder_names() -> Vec<&'static str> {
	Tier::ALL
		.iter()
		.map(|tier| tier.folder_name())
		.collect()
}

pub fn writable_folder_names() -> Vec<&'static str> {
	Tier::ALL
		.iter()
		.filter(|tier| tier.is_writable())
		.map(|tier| tier.folder_name())
		.collect()
}

pub fn normalize_path(path: &Path) -> PathBuf {
	use std::path::Component;
	let mut stack: Vec<std::ffi::OsString> = Vec::new();
	let mut prefix: Option<std::ffi::OsString> = None;
	let mut absolute = false;
	for component in path.components() {
		match component {
			Component::Prefix(prefix_component) => {
				prefix = Some(prefix_component.as_os_str().to_os_string());
			}
			Component::RootDir => {
				absolute = true;
				stack.clear();
			}
			Component::CurDir => {}
			Component::ParentDir => {
				if !stack.is_empty() {
					stack.pop();
				}
				else if !absolute {
					stack.push(std::ffi::OsString::from(".."));
				}
			}
			Component::Normal(part) => stack.push(part.to_os_string()),
		}
	}
	let mut out = PathBuf::new();
	if let Some(prefix) = prefix {
		out.push(prefix);
	}
	if absolute {
		out.push(Path::new("/"));
	}
	for part in stack {
		out.push(part);
	}
	out
}

/// Returns the tier whose folder contains `path`, comparing normalized paths.
pub fn tier_containing(base: &Path, path: &Path) -> Option<Tier> {
	let base = normalize_path(base);
	let path = normalize_path(path);
	Tier::ALL
		.into_iter()
		.find(|tier| path.starts_with(tier.path(&base)))
}
