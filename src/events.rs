//! Listeners declared inline in rendered markup.
//!
//! An attribute `data-on<event>="<handlers>"` (or `on<event>`, which is renamed to the `data-on`
//! form so the browser doesn't interpret it) binds each comma-separated handler to `<event>` on
//! that element. A handler is either the name of a handler of the owning component type, or
//! `<componentId>:<name>` for a handler of another live instance.
//!
//! Bindings are delegated: one DOM listener per event type sits on the component's root element
//! and dispatches to the declarations found between the event target and the root. Declarations
//! are grouped by the surface that rendered them, and every scan of a group is diffed against the
//! previous one, so unchanged declarations are never rebound.

use crate::{
	component::{Instance, WeakInstance},
	dom::{self, COMPONENT_ATTRIBUTE},
	rc_hash_map::RcHashMap,
	registry::Handler,
	temp_set::TempBindingSet,
};
use core::{cell::RefCell, fmt};
use hashbrown::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, error, info_span, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::Element;

pub const ATTRIBUTE_PREFIX: &str = "data-on";
const NATIVE_PREFIX: &str = "on";

/// DOM events that may be declared with a plain `on<event>` attribute. Other events, custom ones
/// included, need the `data-on` form.
const NATIVE_EVENTS: &[&str] = &[
	"abort", "animationend", "animationiteration", "animationstart", "auxclick", "beforeinput", "blur", "cancel",
	"change", "click", "close", "contextmenu", "copy", "cut", "dblclick", "drag", "dragend", "dragenter",
	"dragleave", "dragover", "dragstart", "drop", "error", "focus", "focusin", "focusout", "input", "invalid",
	"keydown", "keypress", "keyup", "load", "mousedown", "mouseenter", "mouseleave", "mousemove", "mouseout",
	"mouseover", "mouseup", "paste", "pointercancel", "pointerdown", "pointerenter", "pointerleave", "pointermove",
	"pointerout", "pointerover", "pointerup", "reset", "resize", "scroll", "select", "submit", "toggle",
	"touchcancel", "touchend", "touchmove", "touchstart", "transitionend", "wheel",
];

/// Returns the event type declared by an attribute named `attribute`, if any.
#[must_use]
pub fn parse_declaration(attribute: &str) -> Option<&str> {
	if let Some(event) = attribute.strip_prefix(ATTRIBUTE_PREFIX) {
		return (!event.is_empty() && event.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')).then_some(event);
	}
	let event = attribute.strip_prefix(NATIVE_PREFIX)?;
	NATIVE_EVENTS.iter().any(|native| native.eq_ignore_ascii_case(event)).then_some(event)
}

/// The handler references in a declaration's value.
pub fn split_handlers(value: &str) -> impl Iterator<Item = &str> {
	value.split(',').map(str::trim).filter(|handler| !handler.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerRef<'a> {
	Own(&'a str),
	Foreign { component: &'a str, name: &'a str },
}
impl<'a> HandlerRef<'a> {
	#[must_use]
	pub fn parse(handler: &'a str) -> Self {
		match handler.split_once(':') {
			Some((component, name)) => Self::Foreign { component, name },
			None => Self::Own(handler),
		}
	}
}

/// One declared (group, event, handler) binding. Identical declarations share one binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
	pub group: String,
	pub event: String,
	pub handler: String,
}

/// A resolved handler together with the instance it's called on.
#[derive(Clone)]
pub struct Binding {
	pub target: WeakInstance,
	pub handler: Handler,
}
impl fmt::Debug for Binding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Binding").field("target", &self.target).finish_non_exhaustive()
	}
}

#[derive(Debug, Default)]
struct Table {
	/// Element ids of the owner's surfaces. Declarations belong to the nearest one.
	surface_ids: HashSet<String>,
	groups: HashMap<String, HashSet<BindingKey>>,
	bindings: HashMap<BindingKey, Binding>,
}

/// Finds the group of a declaring element: the element id of the nearest surface of `owner`
/// containing it, or [`None`] if a nested component's root comes first.
fn owning_group(element: &Element, owner: &str, surface_ids: &HashSet<String>) -> Option<String> {
	let mut current = Some(element.clone());
	while let Some(element) = current {
		if element.get_attribute(COMPONENT_ATTRIBUTE).map_or(false, |component| component != owner) {
			return None;
		}
		let id = element.id();
		if surface_ids.contains(&id) {
			return Some(id);
		}
		current = element.parent_element();
	}
	None
}

type Listener = Closure<dyn Fn(web_sys::Event)>;

pub struct EventsCollector {
	owner: String,
	root: Element,
	table: Rc<RefCell<Table>>,
	listeners: RcHashMap<String, u16, Listener>,
	scan_set: TempBindingSet,
}
impl fmt::Debug for EventsCollector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventsCollector")
			.field("owner", &self.owner)
			.field("table", &self.table)
			.field("listeners", &self.listeners)
			.finish_non_exhaustive()
	}
}
impl EventsCollector {
	#[must_use]
	pub fn new(owner: impl Into<String>, root: Element) -> Self {
		let owner = owner.into();
		let mut table = Table::default();
		table.surface_ids.insert(owner.clone());
		Self {
			owner,
			root,
			table: Rc::new(RefCell::new(table)),
			listeners: RcHashMap::new(),
			scan_set: TempBindingSet::new(),
		}
	}

	pub fn add_surface_id(&mut self, element_id: impl Into<String>) {
		self.table.borrow_mut().surface_ids.insert(element_id.into());
	}

	pub fn remove_surface_id(&mut self, element_id: &str) {
		self.table.borrow_mut().surface_ids.remove(element_id);
	}

	/// Scans `content` (inclusive) for declarations of `group` and updates that group's bindings to match.
	///
	/// `resolve` looks up handler references. Unresolvable ones are reported and skipped.
	#[instrument(skip(self, content, resolve), fields(owner = %self.owner))]
	pub fn attach_listeners(&mut self, content: &Element, group: &str, resolve: &dyn Fn(HandlerRef<'_>) -> Option<Binding>) {
		let elements = match dom::elements_inclusive(content) {
			Ok(elements) => elements,
			Err(error) => return error!("Failed to enumerate elements: {}", error),
		};

		let found = self.scan_set.temp();
		{
			let table = self.table.borrow();
			for element in &elements {
				let names: Vec<String> = element.get_attribute_names().iter().filter_map(|name| name.as_string()).collect();
				for name in names {
					let Some(event) = parse_declaration(&name) else { continue };
					if owning_group(element, &self.owner, &table.surface_ids).as_deref() != Some(group) {
						continue;
					}
					let Some(value) = element.get_attribute(&name) else { continue };

					if !name.starts_with(ATTRIBUTE_PREFIX) {
						let neutral = format!("{}{}", ATTRIBUTE_PREFIX, event);
						let merged = match element.get_attribute(&neutral) {
							Some(existing) if !existing.is_empty() => format!("{},{}", existing, value),
							_ => value.clone(),
						};
						if let Err(error) = element.remove_attribute(&name).and_then(|()| element.set_attribute(&neutral, &merged)) {
							error!("Failed to neutralize inline handler attribute {:?}: {:?}", name, error);
						}
					}

					for handler in split_handlers(&value) {
						found.insert(BindingKey {
							group: group.to_owned(),
							event: event.to_ascii_lowercase(),
							handler: handler.to_owned(),
						});
					}
				}
			}
		}

		let previous = self.table.borrow_mut().groups.remove(group).unwrap_or_default();
		let mut current = HashSet::with_capacity(found.len());

		for removed in previous.difference(found) {
			trace!(event = %removed.event, handler = %removed.handler, "Unbinding.");
			self.table.borrow_mut().bindings.remove(removed);
			if let Err(error) = self.listeners.weak_decrement(&removed.event) {
				error!("Listener count for {:?} underflowed: {:?}", removed.event, error);
			}
		}

		for key in found.iter() {
			if previous.contains(key) {
				current.insert(key.clone());
				continue;
			}

			let Some(binding) = resolve(HandlerRef::parse(&key.handler)) else {
				warn!(group, event = %key.event, handler = %key.handler, "Unknown event handler. Skipping declaration.");
				continue;
			};
			trace!(event = %key.event, handler = %key.handler, "Binding.");
			self.table.borrow_mut().bindings.insert(key.clone(), binding);

			let (owner, root, table) = (&self.owner, &self.root, &self.table);
			if let Err(error) = self.listeners.increment_or_insert_with(key.event.clone(), |event| {
				let listener = delegate(owner.clone(), root.clone(), Rc::clone(table), event.clone());
				if let Err(error) = root.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref()) {
					error!("Failed to add event listener {:?}: {:?}", event, error);
				}
				listener
			}) {
				error!("Too many bindings for event {:?}: {:?}", key.event, error);
			}
			current.insert(key.clone());
		}

		self.table.borrow_mut().groups.insert(group.to_owned(), current);
		self.release_unused_listeners();
	}

	/// Removes all bindings of `group`. No-op for unknown groups.
	pub fn detach_listeners(&mut self, group: &str) {
		let removed = self.table.borrow_mut().groups.remove(group);
		if let Some(removed) = removed {
			debug!(owner = %self.owner, group, count = removed.len(), "Detaching listeners.");
			for key in removed {
				self.table.borrow_mut().bindings.remove(&key);
				if let Err(error) = self.listeners.weak_decrement(&key.event) {
					error!("Listener count for {:?} underflowed: {:?}", key.event, error);
				}
			}
			self.release_unused_listeners();
		}
	}

	pub fn detach_all_listeners(&mut self) {
		let groups: Vec<String> = self.table.borrow().groups.keys().cloned().collect();
		for group in groups {
			self.detach_listeners(&group);
		}
	}

	/// Number of distinct bindings in `group`.
	#[must_use]
	pub fn binding_count(&self, group: &str) -> usize {
		self.table.borrow().groups.get(group).map_or(0, HashSet::len)
	}

	/// Number of DOM listeners currently on the root element.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	fn release_unused_listeners(&mut self) {
		let root = &self.root;
		let released = self
			.listeners
			.drain_weak()
			.map(|(event, listener)| {
				if let Err(error) = root.remove_event_listener_with_callback(&event, listener.as_ref().unchecked_ref()) {
					error!("Failed to remove event listener {:?}: {:?}", event, error);
				}
			})
			.count();
		if released > 0 {
			trace!("Released {} DOM listener(s).", released);
		}
		trace!("Scan set capacity: {}", self.scan_set.capacity());
	}
}
impl Drop for EventsCollector {
	fn drop(&mut self) {
		self.detach_all_listeners();
	}
}

/// Creates the root listener for `event`, which dispatches to all bound declarations between the target and the root.
fn delegate(owner: String, root: Element, table: Rc<RefCell<Table>>, event: String) -> Listener {
	let attribute = format!("{}{}", ATTRIBUTE_PREFIX, event);
	Closure::wrap(Box::new(move |dom_event: web_sys::Event| {
		let span = info_span!("delegate", owner = %owner, event = %event);
		let _enter = span.enter();

		let mut current = dom_event.target().and_then(|target| match target.dyn_into::<Element>() {
			Ok(element) => Some(element),
			Err(target) => target.dyn_into::<web_sys::Node>().ok().and_then(|node| node.parent_element()),
		});

		// Collect first: handlers may re-render and rescan.
		let mut calls = Vec::new();
		{
			let table = table.borrow();
			while let Some(element) = current {
				if let Some(value) = element.get_attribute(&attribute) {
					if let Some(group) = owning_group(&element, &owner, &table.surface_ids) {
						for handler in split_handlers(&value) {
							let key = BindingKey {
								group: group.clone(),
								event: event.clone(),
								handler: handler.to_owned(),
							};
							if let Some(binding) = table.bindings.get(&key) {
								calls.push(binding.clone());
							}
						}
					}
				}
				if element == root {
					break;
				}
				current = element.parent_element();
			}
		}

		for Binding { target, handler } in calls {
			let span = trace_span!("handler");
			let _enter = span.enter();
			match target.upgrade() {
				Some(instance) => handler(&instance, &dom_event),
				None => trace!("Handler target is gone."),
			}
		}
	}) as Box<dyn Fn(web_sys::Event)>)
}

/// Resolves handler references for `owner` against its type and the live instances of its context.
pub(crate) fn resolver(owner: &Instance) -> impl Fn(HandlerRef<'_>) -> Option<Binding> + '_ {
	move |handler: HandlerRef<'_>| match handler {
		HandlerRef::Own(name) => owner.handler(name).map(|handler| Binding {
			target: owner.downgrade(),
			handler,
		}),
		HandlerRef::Foreign { component, name } => {
			let Some(target) = owner.context().instances().get_component(component) else {
				warn!(component, "Event handler references a component that doesn't exist.");
				return None;
			};
			target.handler(name).map(|handler| Binding {
				target: target.downgrade(),
				handler,
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn declarations() {
		assert_eq!(parse_declaration("data-onclick"), Some("click"));
		assert_eq!(parse_declaration("onkeydown"), Some("keydown"));
		assert_eq!(parse_declaration("data-on"), None);
		assert_eq!(parse_declaration("data-title"), None);
		assert_eq!(parse_declaration("one two"), None);
		assert_eq!(parse_declaration("class"), None);
		assert_eq!(parse_declaration("data-onitem-selected"), Some("item-selected"));
	}

	#[test]
	fn plain_attributes_starting_with_on_are_not_declarations() {
		for attribute in ["one", "only", "onward", "on", "onitem-selected"] {
			assert_eq!(parse_declaration(attribute), None, "{}", attribute);
		}
		assert_eq!(parse_declaration("onClick"), Some("Click"));
	}

	#[test]
	fn handler_lists() {
		assert_eq!(split_handlers(" select, ,log ").collect::<Vec<_>>(), ["select", "log"]);
		assert_eq!(split_handlers("").count(), 0);
	}

	#[test]
	fn handler_references() {
		assert_eq!(HandlerRef::parse("select"), HandlerRef::Own("select"));
		assert_eq!(
			HandlerRef::parse("list-1:select"),
			HandlerRef::Foreign {
				component: "list-1",
				name: "select",
			}
		);
	}
}
