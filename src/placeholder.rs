//! The placeholder token format.
//!
//! Template output marks nested surfaces and nested components with HTML comments, which survive
//! parsing at any position (including inside tables) and can't collide with element content:
//!
//! ```text
//! <!--%surface:ID%-->
//! <!--%component:ID:TYPE:DATA%-->
//! <!--%children%-->
//! ```
//!
//! `ID` may be empty for anonymous components, `DATA` is a JSON object. Each field is escaped so
//! that it contains none of `%`, `:`, `-`, `<` or `>` verbatim.

use core::fmt::{self, Display, Formatter};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use thiserror::Error;

const OPEN: &str = "<!--%";
const CLOSE: &str = "%-->";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
	#[error("unknown placeholder kind {0:?}")]
	UnknownKind(String),
	#[error("placeholder is missing its {0} field")]
	MissingField(&'static str),
	#[error("invalid escape sequence in placeholder field {0:?}")]
	BadEscape(String),
	#[error("placeholder data is not a JSON object: {0}")]
	InvalidData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
	/// Another surface of the component whose content contains the placeholder.
	Surface { id: String },
	/// A nested component instance.
	Component {
		id: Option<String>,
		type_name: String,
		data: Map<String, Value>,
	},
	/// The explicit children of the component whose content contains the placeholder.
	Children,
}
impl Placeholder {
	#[must_use]
	pub fn surface(id: impl Into<String>) -> Self {
		Self::Surface { id: id.into() }
	}

	#[must_use]
	pub fn component(type_name: impl Into<String>, id: Option<&str>, data: Map<String, Value>) -> Self {
		Self::Component {
			id: id.map(ToOwned::to_owned),
			type_name: type_name.into(),
			data,
		}
	}

	/// Interprets the data of an HTML comment.
	///
	/// Returns [`None`] for ordinary comments.
	pub fn from_comment(comment: &str) -> Option<Result<Self, PlaceholderError>> {
		let body = comment.strip_prefix('%')?.strip_suffix('%')?;
		Some(Self::parse_body(body))
	}

	fn parse_body(body: &str) -> Result<Self, PlaceholderError> {
		let mut fields = body.split(':');
		let kind = fields.next().unwrap_or_default();
		match kind {
			"surface" => {
				let id = unescape(fields.next().ok_or(PlaceholderError::MissingField("id"))?)?;
				if id.is_empty() {
					return Err(PlaceholderError::MissingField("id"));
				}
				Ok(Self::Surface { id })
			}
			"component" => {
				let id = unescape(fields.next().ok_or(PlaceholderError::MissingField("id"))?)?;
				let type_name = unescape(fields.next().ok_or(PlaceholderError::MissingField("type"))?)?;
				if type_name.is_empty() {
					return Err(PlaceholderError::MissingField("type"));
				}
				let data = match fields.next() {
					None | Some("") => Map::new(),
					Some(data) => match serde_json::from_str(&unescape(data)?) {
						Ok(Value::Object(data)) => data,
						Ok(other) => return Err(PlaceholderError::InvalidData(other.to_string())),
						Err(error) => return Err(PlaceholderError::InvalidData(error.to_string())),
					},
				};
				Ok(Self::Component {
					id: if id.is_empty() { None } else { Some(id) },
					type_name,
					data,
				})
			}
			"children" => Ok(Self::Children),
			other => Err(PlaceholderError::UnknownKind(other.to_owned())),
		}
	}
}
impl Display for Placeholder {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(OPEN)?;
		match self {
			Self::Surface { id } => write!(f, "surface:{}", escape(id))?,
			Self::Component { id, type_name, data } => {
				write!(f, "component:{}:{}", escape(id.as_deref().unwrap_or_default()), escape(type_name))?;
				if !data.is_empty() {
					write!(f, ":{}", escape(&Value::Object(data.clone()).to_string()))?;
				}
			}
			Self::Children => f.write_str("children")?,
		}
		f.write_str(CLOSE)
	}
}

fn escape(field: &str) -> String {
	let mut escaped = String::with_capacity(field.len());
	for c in field.chars() {
		match c {
			'%' | ':' | '-' | '<' | '>' => escaped.push_str(&format!("%{:02X}", c as u32)),
			c => escaped.push(c),
		}
	}
	escaped
}

fn unescape(field: &str) -> Result<String, PlaceholderError> {
	let bad = || PlaceholderError::BadEscape(field.to_owned());
	let mut bytes = Vec::with_capacity(field.len());
	let mut rest = field.as_bytes();
	while let Some((&byte, tail)) = rest.split_first() {
		if byte == b'%' {
			let hex = tail.get(..2).ok_or_else(bad)?;
			let hex = core::str::from_utf8(hex).map_err(|_| bad())?;
			bytes.push(u8::from_str_radix(hex, 16).map_err(|_| bad())?);
			rest = &tail[2..];
		} else {
			bytes.push(byte);
			rest = tail;
		}
	}
	String::from_utf8(bytes).map_err(|_| bad())
}

/// Finds all placeholder tokens in `content`, in document order.
pub fn scan(content: &str) -> Scan<'_> {
	Scan { rest: content }
}

#[derive(Debug, Clone)]
pub struct Scan<'a> {
	rest: &'a str,
}
impl Iterator for Scan<'_> {
	type Item = Result<Placeholder, PlaceholderError>;

	fn next(&mut self) -> Option<Self::Item> {
		let start = self.rest.find(OPEN)?;
		let after_open = &self.rest[start + OPEN.len()..];
		let Some(end) = after_open.find(CLOSE) else {
			self.rest = "";
			return None;
		};
		self.rest = &after_open[end + CLOSE.len()..];
		Some(Placeholder::parse_body(&after_open[..end]))
	}
}

/// Generates ids for anonymous component placeholders.
///
/// Ids combine the scope (the element id of the surface being resolved) with the type name and
/// the number of earlier anonymous placeholders of that type in the same resolution, so that the
/// same position yields the same id on every re-render.
#[derive(Debug, Clone, Default)]
pub struct PositionalIds {
	scope: String,
	counters: HashMap<String, usize>,
}
impl PositionalIds {
	#[must_use]
	pub fn new(scope: impl Into<String>) -> Self {
		Self {
			scope: scope.into(),
			counters: HashMap::new(),
		}
	}

	pub fn next(&mut self, type_name: &str) -> String {
		let counter = self.counters.entry_ref(type_name).or_insert(0);
		let id = format!("{}-{}-{}", self.scope, type_name, counter);
		*counter += 1;
		id
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn object(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => unreachable!(),
		}
	}

	#[test]
	fn token_shapes() {
		assert_eq!(Placeholder::surface("header").to_string(), "<!--%surface:header%-->");
		assert_eq!(Placeholder::Children.to_string(), "<!--%children%-->");
		assert_eq!(
			Placeholder::component("Button", None, Map::new()).to_string(),
			"<!--%component::Button%-->"
		);
	}

	#[test]
	fn escaped_fields_survive_comment_syntax() {
		let placeholder = Placeholder::component("List", Some("my-list"), object(json!({ "label": "a --> b: 50%", "n": -1 })));
		let token = placeholder.to_string();
		let body = &token[OPEN.len() - 1..token.len() - CLOSE.len() + 1];
		assert!(!body[1..body.len() - 1].contains("-->"));
		assert!(!body.contains('<'));
		assert_eq!(Placeholder::from_comment(body), Some(Ok(placeholder)));
	}

	#[test]
	fn ordinary_comments_are_not_placeholders() {
		assert_eq!(Placeholder::from_comment(" just a comment "), None);
		assert_eq!(Placeholder::from_comment("%"), None);
	}

	#[test]
	fn malformed_placeholders() {
		assert_eq!(
			Placeholder::from_comment("%widget:x%"),
			Some(Err(PlaceholderError::UnknownKind("widget".to_owned())))
		);
		assert_eq!(Placeholder::from_comment("%surface%"), Some(Err(PlaceholderError::MissingField("id"))));
		assert_eq!(Placeholder::from_comment("%component:a:%"), Some(Err(PlaceholderError::MissingField("type"))));
		assert!(matches!(Placeholder::from_comment("%surface:%4%"), Some(Err(PlaceholderError::BadEscape(_)))));
		assert!(matches!(
			Placeholder::from_comment("%component:a:B:%5B1%5D%"),
			Some(Err(PlaceholderError::InvalidData(_)))
		));
	}

	#[test]
	fn scan_finds_tokens_in_order() {
		let content = format!(
			"<div>{}<p>{}</p><!-- plain -->{}</div>",
			Placeholder::surface("a"),
			Placeholder::component("B", Some("b"), Map::new()),
			Placeholder::Children,
		);
		let found: Vec<_> = scan(&content).collect::<Result<_, _>>().unwrap();
		assert_eq!(
			found,
			[
				Placeholder::surface("a"),
				Placeholder::component("B", Some("b"), Map::new()),
				Placeholder::Children,
			]
		);
		assert_eq!(scan("<!--%surface:x").count(), 0);
	}

	#[test]
	fn positional_ids_are_stable_per_type() {
		let ids = |types: &[&str]| {
			let mut ids = PositionalIds::new("c1-body");
			types.iter().map(|t| ids.next(t)).collect::<Vec<_>>()
		};
		assert_eq!(ids(&["Item", "Icon", "Item"]), ["c1-body-Item-0", "c1-body-Icon-0", "c1-body-Item-1"]);
		// Inserting a different type before doesn't shift the ids of the others.
		assert_eq!(ids(&["Badge", "Item", "Icon", "Item"])[1..], ["c1-body-Item-0", "c1-body-Icon-0", "c1-body-Item-1"]);
	}
}
