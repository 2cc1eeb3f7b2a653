//! Per-instance construction config.

use crate::{
	attrs::is_reserved,
	component::Instance,
	error::{Error, Result},
};
use serde_json::{Map, Value};

/// Where [`decorate`](`Instance::decorate`) finds the existing root element.
#[derive(Debug, Clone)]
pub enum ElementRef {
	Element(web_sys::Element),
	/// Looked up with `document.querySelector`.
	Selector(String),
}

#[derive(Debug, Clone, Default)]
pub struct ComponentConfig {
	pub(crate) id: Option<String>,
	pub(crate) element: Option<ElementRef>,
	pub(crate) attrs: Map<String, Value>,
	pub(crate) children: Vec<Instance>,
}
impl ComponentConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Splits a JSON object into reserved keys and initial attribute values.
	///
	/// `id` must be a string and `element` a selector string; other values of these keys are ignored.
	///
	/// # Errors
	///
	/// Iff `data` contains any other [reserved](`crate::attrs::RESERVED_NAMES`) key.
	pub fn from_data(mut data: Map<String, Value>) -> Result<Self> {
		let id = match data.remove("id") {
			Some(Value::String(id)) => Some(id),
			_ => None,
		};
		let element = match data.remove("element") {
			Some(Value::String(selector)) => Some(ElementRef::Selector(selector)),
			_ => None,
		};
		if let Some(name) = data.keys().find(|name| is_reserved(name)) {
			return Err(Error::ReservedAttribute { name: name.clone() });
		}
		Ok(Self {
			id,
			element,
			attrs: data,
			children: Vec::new(),
		})
	}

	#[must_use]
	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	#[must_use]
	pub fn element(mut self, element: web_sys::Element) -> Self {
		self.element = Some(ElementRef::Element(element));
		self
	}

	#[must_use]
	pub fn selector(mut self, selector: impl Into<String>) -> Self {
		self.element = Some(ElementRef::Selector(selector.into()));
		self
	}

	/// Sets the initial value of an attribute. Reserved names are rejected at construction.
	#[must_use]
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attrs.insert(name.into(), value.into());
		self
	}

	#[must_use]
	pub fn children(mut self, children: Vec<Instance>) -> Self {
		self.children = children;
		self
	}

	#[must_use]
	pub fn get_id(&self) -> Option<&str> {
		self.id.as_deref()
	}

	#[must_use]
	pub fn attrs(&self) -> &Map<String, Value> {
		&self.attrs
	}
}
