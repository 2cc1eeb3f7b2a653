//! Placeholder resolution over parsed content.
//!
//! Placeholders are processed depth-first in document order. A surface placeholder is replaced by
//! that surface's element, resolved first, and a component placeholder by the root element of a
//! nested instance. Instances are looked up by id before anything is constructed, so a placeholder
//! that reappears (at any position) keeps its instance and DOM node.

use crate::{
	component::{Instance, Lifecycle},
	config::ComponentConfig,
	dom,
	error::Result,
	placeholder::{Placeholder, PositionalIds},
	render,
	surface::ELEMENT,
};
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::{debug, trace, warn};
use web_sys::{Element, Node};

/// State of one pass over a surface's content.
#[derive(Debug)]
pub(crate) struct Resolution {
	ids: PositionalIds,
	/// Ids of the nested components and children placed so far.
	pub(crate) placed: Vec<String>,
}
impl Resolution {
	pub(crate) fn new(element_id: &str) -> Self {
		Self {
			ids: PositionalIds::new(element_id),
			placed: Vec::new(),
		}
	}
}

/// The id a component placeholder refers to: explicit, from its data, or positional.
pub(crate) fn target_id(explicit: Option<String>, data: &Map<String, Value>, type_name: &str, resolution: &mut Resolution) -> String {
	explicit
		.or_else(|| data.get("id").and_then(Value::as_str).map(ToOwned::to_owned))
		.unwrap_or_else(|| resolution.ids.next(type_name))
}

/// Replaces every placeholder below `root`.
pub(crate) fn resolve_placeholders(owner: &Instance, root: &Node, resolution: &mut Resolution) -> Result<()> {
	for (comment, placeholder) in dom::placeholder_comments(root) {
		let nodes: Vec<Node> = match placeholder {
			Ok(Placeholder::Surface { id }) if id == ELEMENT => {
				warn!(component = %owner.id(), "The root element can't be placed in a surface. Skipping placeholder.");
				Vec::new()
			}
			Ok(Placeholder::Surface { id }) => match render::resolve_surface(owner, &id)? {
				Some(element) => vec![element.into()],
				None => {
					debug!(component = %owner.id(), surface = %id, "No such surface. Dropping placeholder.");
					Vec::new()
				}
			},
			Ok(Placeholder::Component { id, type_name, data }) => {
				let id = target_id(id, &data, &type_name, resolution);
				resolve_component(owner, id, &type_name, data, resolution, None)?
					.into_iter()
					.map(Into::into)
					.collect()
			}
			Ok(Placeholder::Children) => place_children(owner, resolution)?,
			Err(error) => {
				warn!(component = %owner.id(), "Malformed placeholder: {}", error);
				Vec::new()
			}
		};
		dom::replace_comment(&comment, &nodes)?;
	}
	Ok(())
}

/// Binds the placeholders of freshly generated content to what `markup` already contains.
///
/// Returns `false` iff a nested component or child has no root element in `markup`, in which case
/// the caller has to rewrite. Instances created up to that point are picked up again by the rewrite.
pub(crate) fn decorate_placeholders(owner: &Instance, scope: &Node, markup: &Element, resolution: &mut Resolution) -> Result<bool> {
	for (_, placeholder) in dom::placeholder_comments(scope) {
		match placeholder {
			Ok(Placeholder::Surface { id }) if id == ELEMENT => warn!(component = %owner.id(), "The root element can't be placed in a surface."),
			Ok(Placeholder::Surface { id }) => {
				render::decorate_surface(owner, &id)?;
			}
			Ok(Placeholder::Component { id, type_name, data }) => {
				let id = target_id(id, &data, &type_name, resolution);
				let Some(found) = dom::find_by_id(markup, &id) else {
					debug!(component = %owner.id(), nested = %id, "Nested component not found in existing markup.");
					return Ok(false);
				};
				resolve_component(owner, id, &type_name, data, resolution, Some(found))?;
			}
			Ok(Placeholder::Children) => {
				for child in owner.children() {
					if child.is_disposed() {
						continue;
					}
					let Some(found) = dom::find_by_id(markup, child.id()) else {
						debug!(component = %owner.id(), child = %child.id(), "Child not found in existing markup.");
						return Ok(false);
					};
					if child.lifecycle() == Lifecycle::Created {
						child.decorate_sub(&found)?;
					}
					resolution.placed.push(child.id().to_owned());
				}
			}
			Err(error) => warn!(component = %owner.id(), "Malformed placeholder: {}", error),
		}
	}
	Ok(true)
}

/// Finds or creates the nested component `id` and renders it as a sub-component if necessary.
///
/// If `markup` is given, a new instance decorates it instead of rendering.
/// Returns [`None`] (after logging a warning) iff the placeholder can't be resolved.
pub(crate) fn resolve_component(
	owner: &Instance,
	id: String,
	type_name: &str,
	data: Map<String, Value>,
	resolution: &mut Resolution,
	markup: Option<Element>,
) -> Result<Option<Element>> {
	let context = owner.context();
	let component_type = match context.components().get_constructor(type_name) {
		Ok(component_type) => component_type,
		Err(error) => {
			warn!(component = %owner.id(), "{}. Skipping placeholder.", error);
			return Ok(None);
		}
	};
	let config = match ComponentConfig::from_data(data) {
		Ok(config) => config,
		Err(error) => {
			warn!(component = %owner.id(), nested = %id, "Invalid placeholder data: {}. Skipping placeholder.", error);
			return Ok(None);
		}
	};

	let instance = match context.instances().get_component(&id) {
		Some(existing) if !existing.is_disposed() && existing.component_type().is(type_name) => {
			trace!(component = %owner.id(), nested = %id, "Reusing nested component.");
			existing.set_attrs(config.attrs())?;
			existing
		}
		_ => match Instance::new(component_type, config.id(id.as_str()), Rc::clone(context)) {
			Ok(instance) => {
				owner.state_mut().owned.insert(id.clone());
				instance
			}
			Err(error) => {
				warn!(component = %owner.id(), nested = %id, "Failed to create nested component: {}. Skipping placeholder.", error);
				return Ok(None);
			}
		},
	};
	owner.state_mut().components.insert(id.clone(), instance.clone());

	if instance.lifecycle() == Lifecycle::Created {
		match &markup {
			Some(markup) => instance.decorate_sub(markup)?,
			None => instance.render_sub()?,
		}
	}
	resolution.placed.push(id);
	Ok(instance.element())
}

/// Renders the owner's explicit children as sub-components and returns their root elements.
fn place_children(owner: &Instance, resolution: &mut Resolution) -> Result<Vec<Node>> {
	let mut nodes = Vec::new();
	for child in owner.children() {
		if child.is_disposed() {
			continue;
		}
		if child.lifecycle() == Lifecycle::Created {
			child.render_sub()?;
		}
		if let Some(element) = child.element() {
			nodes.push(element.into());
		}
		resolution.placed.push(child.id().to_owned());
	}
	Ok(nodes)
}
