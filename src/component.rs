//! Component instances and their lifecycle.
//!
//! ```text
//! Created ──render()──▶ Rendering ──┐
//!    │                              ├──▶ Attached ⇄ Detached
//!    └──decorate()──▶ Decorating ───┘
//! ```
//!
//! Every non-terminal state can move to `Disposed`.

use crate::{
	attrs::{AttrBatch, AttributeStore, Write},
	config::{ComponentConfig, ElementRef},
	context::Context,
	dom,
	error::{Error, Result},
	events::EventsCollector,
	placeholder::Placeholder,
	registry::{ComponentType, Handler, Merged},
	render,
	surface::{element_id, CacheState, Content, Surface, SurfaceSpec, ELEMENT},
};
use core::{
	cell::{Ref, RefCell, RefMut},
	fmt::{self, Debug, Formatter},
};
use hashbrown::{HashMap, HashSet};
use serde_json::{Map, Value};
use std::rc::{Rc, Weak};
use tracing::{debug, error, instrument, trace};
use web_sys::Element;

/// Behaviour of a component type. All methods have no-op defaults.
///
/// Methods receive the [`Instance`] they're called for, which gives access to attributes, nested
/// components and surfaces. They may call back into it freely: the engine holds no borrows while
/// user code runs.
pub trait Component: 'static {
	fn created(&self, _instance: &Instance) {}
	fn attached(&self, _instance: &Instance) {}
	fn detached(&self, _instance: &Instance) {}
	/// Called once, before the instance's resources are released.
	fn disposed(&self, _instance: &Instance) {}

	/// Content of the root element.
	///
	/// Defaults to a placeholder for each surface, in declaration order.
	fn element_content(&self, instance: &Instance) -> Option<Content> {
		Some(instance.default_element_content())
	}

	/// Content of the surface `local_id`. [`None`] leaves the surface as it is.
	fn surface_content(&self, _instance: &Instance, _local_id: &str) -> Option<Content> {
		None
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
	Created,
	Rendering,
	Decorating,
	Attached,
	Detached,
	Disposed,
}

pub type AttrsListener = Rc<dyn Fn(&Instance, &AttrBatch)>;

pub(crate) struct State {
	pub(crate) lifecycle: Lifecycle,
	pub(crate) attrs: AttributeStore,
	/// Local ids of all surfaces other than [`ELEMENT`], in declaration order.
	pub(crate) surfaces: Vec<String>,
	pub(crate) element_ref: Option<ElementRef>,
	pub(crate) element: Option<Element>,
	pub(crate) children: Vec<Instance>,
	/// Nested components by the id their placeholder resolved to.
	pub(crate) components: HashMap<String, Instance>,
	/// Ids of nested components this instance instantiated.
	pub(crate) owned: HashSet<String>,
	pub(crate) in_document: bool,
	pub(crate) parent: Option<Element>,
	pub(crate) events: Option<EventsCollector>,
	pub(crate) listeners: Vec<AttrsListener>,
	/// Surfaces invalidated while out of the document.
	pub(crate) pending_dirty: Vec<String>,
	/// Surfaces currently being resolved, to break placeholder cycles.
	pub(crate) resolving: HashSet<String>,
	pub(crate) sub_component: bool,
}

struct Inner {
	id: String,
	component_type: Rc<ComponentType>,
	merged: Rc<Merged>,
	behavior: Rc<dyn Component>,
	context: Rc<Context>,
	state: RefCell<State>,
}

/// A shared handle to a live component instance.
#[derive(Clone)]
pub struct Instance(Rc<Inner>);
impl Debug for Instance {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Instance");
		debug.field("id", &self.0.id).field("type", &self.0.component_type.name());
		if let Ok(state) = self.0.state.try_borrow() {
			debug.field("lifecycle", &state.lifecycle).field("in_document", &state.in_document);
		}
		debug.finish_non_exhaustive()
	}
}

#[derive(Debug, Clone)]
pub struct WeakInstance(Weak<Inner>);
impl WeakInstance {
	#[must_use]
	pub fn upgrade(&self) -> Option<Instance> {
		self.0.upgrade().map(Instance)
	}
}

impl Instance {
	/// Constructs an instance of `component_type` and registers it and its surfaces with `context`.
	///
	/// Doesn't touch the DOM.
	///
	/// # Errors
	///
	/// Iff the type fails validation or `config` uses a reserved attribute name.
	#[instrument(skip_all, fields(component_type = component_type.name()))]
	pub fn new(component_type: Rc<ComponentType>, config: ComponentConfig, context: Rc<Context>) -> Result<Self> {
		component_type.validate()?;
		let merged = component_type.merged();
		let ComponentConfig { id, element, attrs, children } = config;
		let id = id.unwrap_or_else(|| context.generate_id());
		let store = AttributeStore::new(id.clone(), Rc::clone(&merged.attrs), &attrs)?;

		let surfaces: Vec<String> = merged.surfaces.iter().map(|(local_id, _)| local_id.clone()).collect();
		context
			.surfaces()
			.add_surface(Surface::new(id.as_str(), ELEMENT, SurfaceSpec::new().render_attrs(merged.element_render_attrs.clone())));
		for (local_id, spec) in &merged.surfaces {
			context.surfaces().add_surface(Surface::new(id.as_str(), local_id.as_str(), spec.clone()));
		}

		let instance = Self(Rc::new(Inner {
			behavior: component_type.instantiate(),
			id,
			component_type,
			merged,
			context,
			state: RefCell::new(State {
				lifecycle: Lifecycle::Created,
				attrs: store,
				surfaces,
				element_ref: element,
				element: None,
				children,
				components: HashMap::new(),
				owned: HashSet::new(),
				in_document: false,
				parent: None,
				events: None,
				listeners: Vec::new(),
				pending_dirty: Vec::new(),
				resolving: HashSet::new(),
				sub_component: false,
			}),
		}));
		instance.0.context.instances().set_component(instance.clone());
		debug!(component = %instance.id(), "Created.");

		instance.behavior().created(&instance);
		Ok(instance)
	}

	#[must_use]
	pub fn id(&self) -> &str {
		&self.0.id
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakInstance {
		WeakInstance(Rc::downgrade(&self.0))
	}

	#[must_use]
	pub fn component_type(&self) -> &Rc<ComponentType> {
		&self.0.component_type
	}

	#[must_use]
	pub fn context(&self) -> &Rc<Context> {
		&self.0.context
	}

	pub(crate) fn merged(&self) -> &Merged {
		&self.0.merged
	}

	pub(crate) fn behavior(&self) -> Rc<dyn Component> {
		Rc::clone(&self.0.behavior)
	}

	pub(crate) fn state(&self) -> Ref<'_, State> {
		self.0.state.borrow()
	}

	pub(crate) fn state_mut(&self) -> RefMut<'_, State> {
		self.0.state.borrow_mut()
	}

	#[must_use]
	pub fn lifecycle(&self) -> Lifecycle {
		self.state().lifecycle
	}

	#[must_use]
	pub fn in_document(&self) -> bool {
		self.state().in_document
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.lifecycle() == Lifecycle::Disposed
	}

	/// Whether the root element has been built or adopted.
	#[must_use]
	pub fn is_rendered(&self) -> bool {
		matches!(self.lifecycle(), Lifecycle::Attached | Lifecycle::Detached)
	}

	/// Whether this instance was rendered into another component's content.
	#[must_use]
	pub fn is_sub_component(&self) -> bool {
		self.state().sub_component
	}

	/// The root element, once rendered or decorated.
	#[must_use]
	pub fn element(&self) -> Option<Element> {
		self.state().element.clone()
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<Value> {
		self.state().attrs.get(name).cloned()
	}

	/// Writes an attribute. Change notification is deferred; see [`crate::attrs`].
	///
	/// # Errors
	///
	/// Iff the instance is disposed or `name` isn't declared.
	pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Write> {
		let write = self.state_mut().attrs.set(name, value.into())?;
		if write == (Write::Queued { opened_batch: true }) {
			self.schedule_flush();
		}
		Ok(write)
	}

	/// Writes every declared attribute in `values`. Undeclared keys are ignored, as at construction.
	///
	/// # Errors
	///
	/// Iff the instance is disposed.
	pub fn set_attrs(&self, values: &Map<String, Value>) -> Result<()> {
		for (name, value) in values {
			if self.merged().attrs.get(name).is_none() {
				debug!(component = %self.id(), attribute = %name, "Ignoring undeclared attribute.");
				continue;
			}
			self.set(name, value.clone())?;
		}
		Ok(())
	}

	/// Registers a callback for every delivered attribute batch.
	pub fn on_attrs_changed(&self, listener: impl Fn(&Instance, &AttrBatch) + 'static) {
		self.state_mut().listeners.push(Rc::new(listener));
	}

	fn schedule_flush(&self) {
		trace!(component = %self.id(), "Scheduling attribute batch.");
		let instance = self.downgrade();
		self.context().scheduler().schedule(Box::new(move || {
			if let Some(instance) = instance.upgrade() {
				render::flush(&instance);
			}
		}));
	}

	/// A registered event handler of this instance's type.
	#[must_use]
	pub fn handler(&self, name: &str) -> Option<Handler> {
		self.merged().handlers.get(name).cloned()
	}

	/// Local ids of all surfaces other than the root element, in declaration order.
	#[must_use]
	pub fn surface_ids(&self) -> Vec<String> {
		self.state().surfaces.clone()
	}

	/// Element ids of all surfaces, the root element's first.
	pub(crate) fn surface_element_ids(&self) -> Vec<String> {
		let state = self.state();
		core::iter::once(self.id().to_owned())
			.chain(state.surfaces.iter().map(|local_id| element_id(self.id(), local_id)))
			.collect()
	}

	/// Surface placeholders for all surfaces, in order.
	#[must_use]
	pub fn default_element_content(&self) -> Content {
		Content::Html(self.state().surfaces.iter().map(|local_id| Placeholder::surface(local_id.as_str()).to_string()).collect())
	}

	/// Registers an additional surface. Re-adding an existing one replaces its declaration.
	///
	/// The surface is rendered once it's referenced by resolved content or through [`render_surface`](`Instance::render_surface`).
	///
	/// # Errors
	///
	/// Iff `local_id` is reserved or the instance is disposed.
	pub fn add_surface(&self, local_id: &str, spec: SurfaceSpec) -> Result<()> {
		if local_id == ELEMENT {
			return Err(Error::ReservedSurface { name: ELEMENT.to_owned() });
		}
		self.ensure_live()?;
		self.context().surfaces().add_surface(Surface::new(self.id(), local_id, spec));
		let mut state = self.state_mut();
		if !state.surfaces.iter().any(|existing| existing == local_id) {
			state.surfaces.push(local_id.to_owned());
		}
		if let Some(events) = state.events.as_mut() {
			events.add_surface_id(element_id(self.id(), local_id));
		}
		Ok(())
	}

	/// The element of a surface, [`ELEMENT`] included.
	#[must_use]
	pub fn surface_element(&self, local_id: &str) -> Option<Element> {
		self.context().surfaces().with_surface(&element_id(self.id(), local_id), |surface| surface.element().cloned()).flatten()
	}

	#[must_use]
	pub fn surface_cache_state(&self, local_id: &str) -> Option<CacheState> {
		self.context().surfaces().with_surface(&element_id(self.id(), local_id), Surface::cache_state)
	}

	/// Makes the next resolution of the surface commit even if its content is unchanged.
	pub fn clear_surface_cache(&self, local_id: &str) {
		self.context().surfaces().with_surface_mut(&element_id(self.id(), local_id), Surface::clear_cache);
	}

	/// Resolves one surface now, committing it only if its content changed.
	///
	/// Returns the surface element, or [`None`] for unknown surfaces.
	///
	/// # Errors
	///
	/// Iff the instance is disposed or not rendered yet, or a DOM operation fails.
	#[instrument(skip(self), fields(component = %self.id()))]
	pub fn render_surface(&self, local_id: &str) -> Result<Option<Element>> {
		self.ensure_live()?;
		if !self.is_rendered() {
			return Err(Error::MissingElement { id: self.id().to_owned() });
		}
		let element = render::resolve_surface(self, local_id)?;
		self.enter_nested();
		Ok(element)
	}

	/// A nested component by the id its placeholder resolved to.
	#[must_use]
	pub fn component(&self, name: &str) -> Option<Instance> {
		self.state().components.get(name).cloned()
	}

	#[must_use]
	pub fn components(&self) -> Vec<String> {
		self.state().components.keys().cloned().collect()
	}

	#[must_use]
	pub fn children(&self) -> Vec<Instance> {
		self.state().children.clone()
	}

	fn ensure_live(&self) -> Result<()> {
		if self.is_disposed() {
			Err(Error::Disposed { id: self.id().to_owned() })
		} else {
			Ok(())
		}
	}

	fn begin(&self, next: Lifecycle) -> Result<()> {
		let mut state = self.state_mut();
		match state.lifecycle {
			Lifecycle::Created => {
				state.lifecycle = next;
				Ok(())
			}
			Lifecycle::Disposed => Err(Error::Disposed { id: self.id().to_owned() }),
			_ => Err(Error::AlreadyRendered { id: self.id().to_owned() }),
		}
	}

	/// Builds the root element and all surfaces, then appends the root to `parent` (default: `document.body`).
	///
	/// # Errors
	///
	/// Iff the instance was already rendered or decorated, is disposed, or a DOM operation fails.
	#[instrument(skip(self, parent), fields(component = %self.id()))]
	pub fn render(&self, parent: Option<&Element>) -> Result<()> {
		self.begin(Lifecycle::Rendering)?;
		let root = render::render_root(self)?;
		self.finish_rendering();

		let parent = match parent {
			Some(parent) => parent.clone(),
			None => body()?,
		};
		parent.append_child(&root).map_err(Error::dom)?;
		self.state_mut().parent = Some(parent);
		self.enter_document();
		Ok(())
	}

	/// Adopts an existing root element (from the config's `element`, or by id) and keeps its markup
	/// wherever it structurally matches freshly generated content.
	///
	/// # Errors
	///
	/// Iff the instance was already rendered or decorated, is disposed, no root element is found,
	/// or a DOM operation fails.
	#[instrument(skip(self), fields(component = %self.id()))]
	pub fn decorate(&self) -> Result<()> {
		match self.lifecycle() {
			Lifecycle::Created => (),
			Lifecycle::Disposed => return Err(Error::Disposed { id: self.id().to_owned() }),
			_ => return Err(Error::AlreadyRendered { id: self.id().to_owned() }),
		}
		let element_ref = self.state().element_ref.clone();
		let root = match element_ref {
			Some(ElementRef::Element(element)) => Some(element),
			Some(ElementRef::Selector(selector)) => dom::document()?.query_selector(&selector).map_err(Error::dom)?,
			None => dom::document()?.get_element_by_id(self.id()),
		}
		.ok_or_else(|| Error::MissingElement { id: self.id().to_owned() })?;

		self.begin(Lifecycle::Decorating)?;
		render::decorate_root(self, &root)?;
		self.finish_rendering();

		self.state_mut().parent = root.parent_element();
		if root.is_connected() {
			self.enter_document();
		}
		Ok(())
	}

	/// Renders the root element without inserting it anywhere.
	pub(crate) fn render_sub(&self) -> Result<()> {
		self.begin(Lifecycle::Rendering)?;
		render::render_root(self)?;
		self.state_mut().sub_component = true;
		self.finish_rendering();
		Ok(())
	}

	/// Decorates `root` without moving it.
	pub(crate) fn decorate_sub(&self, root: &Element) -> Result<()> {
		self.begin(Lifecycle::Decorating)?;
		render::decorate_root(self, root)?;
		self.state_mut().sub_component = true;
		self.finish_rendering();
		Ok(())
	}

	fn finish_rendering(&self) {
		self.state_mut().lifecycle = Lifecycle::Detached;
		render::run_syncs(self, None);
	}

	/// (Re)inserts the root element into `parent`, the remembered parent or `document.body`. Renders first if necessary.
	///
	/// The remembered parent is where the root element last entered the document, which for a
	/// nested component is the surface it was placed in.
	///
	/// No-op while in the document.
	///
	/// # Errors
	///
	/// Iff the instance is disposed or a DOM operation fails.
	#[instrument(skip(self, parent), fields(component = %self.id()))]
	pub fn attach(&self, parent: Option<&Element>) -> Result<()> {
		match self.lifecycle() {
			Lifecycle::Disposed => return Err(Error::Disposed { id: self.id().to_owned() }),
			Lifecycle::Created => return self.render(parent),
			_ if self.in_document() => return Ok(()),
			_ => (),
		}

		let (root, remembered) = {
			let state = self.state();
			(state.element.clone(), state.parent.clone())
		};
		let root = root.ok_or_else(|| Error::MissingElement { id: self.id().to_owned() })?;
		let parent = match parent.cloned().or(remembered) {
			Some(parent) => parent,
			None => body()?,
		};
		parent.append_child(&root).map_err(Error::dom)?;
		self.state_mut().parent = Some(parent);
		self.enter_document();
		Ok(())
	}

	/// Removes the root element from its parent. No-op while out of the document.
	///
	/// # Errors
	///
	/// Iff a DOM operation fails.
	#[instrument(skip(self), fields(component = %self.id()))]
	pub fn detach(&self) -> Result<()> {
		if !self.in_document() {
			return Ok(());
		}
		if let Some(root) = self.element() {
			if let Some(parent) = root.parent_node() {
				parent.remove_child(&root).map_err(Error::dom)?;
			}
		}
		self.leave_document();
		Ok(())
	}

	/// Marks this instance and its placed nested components as in the document.
	pub(crate) fn enter_document(&self) {
		let pending = {
			let mut state = self.state_mut();
			if state.in_document || state.lifecycle == Lifecycle::Disposed {
				return;
			}
			state.in_document = true;
			state.lifecycle = Lifecycle::Attached;
			if let Some(parent) = state.element.as_ref().and_then(|root| root.parent_element()) {
				state.parent = Some(parent);
			}
			core::mem::take(&mut state.pending_dirty)
		};
		trace!(component = %self.id(), "Entering document.");

		render::rebind_all(self);
		for local_id in pending {
			if let Err(error) = render::resolve_surface(self, &local_id) {
				error!(component = %self.id(), surface = %local_id, "Deferred surface update failed: {}", error);
			}
		}
		self.enter_nested();
		self.behavior().attached(self);
	}

	/// Moves nested components that landed in the document with this one there as well.
	///
	/// Nested components that were detached on their own stay out until they're attached or placed again.
	pub(crate) fn enter_nested(&self) {
		if !self.in_document() {
			return;
		}
		for nested in self.placed() {
			if nested.element().map_or(false, |root| root.is_connected()) {
				nested.enter_document();
			}
		}
	}

	pub(crate) fn leave_document(&self) {
		{
			let mut state = self.state_mut();
			if !state.in_document {
				return;
			}
			state.in_document = false;
			if state.lifecycle == Lifecycle::Attached {
				state.lifecycle = Lifecycle::Detached;
			}
			if let Some(events) = state.events.as_mut() {
				events.detach_all_listeners();
			}
		}
		trace!(component = %self.id(), "Leaving document.");

		for nested in self.placed() {
			nested.leave_document();
		}
		self.behavior().detached(self);
	}

	/// Nested components and children currently placed in any surface.
	pub(crate) fn placed(&self) -> Vec<Instance> {
		let context = self.context();
		let ids: Vec<String> = self
			.surface_element_ids()
			.iter()
			.filter_map(|element_id| context.surfaces().with_surface(element_id, |surface| surface.components().to_vec()))
			.flatten()
			.collect();
		ids.iter().filter_map(|id| context.instances().get_component(id)).collect()
	}

	/// Releases everything this instance holds, including nested components it instantiated.
	/// Shared nested components and explicit children survive.
	///
	/// No-op if already disposed.
	#[instrument(skip(self), fields(component = %self.id()))]
	pub fn dispose(&self) {
		if self.is_disposed() {
			return;
		}
		self.leave_document();
		let (root, owned) = {
			let mut state = self.state_mut();
			state.lifecycle = Lifecycle::Disposed;
			let owned: Vec<Instance> = state
				.components
				.iter()
				.filter(|(id, _)| state.owned.contains(*id))
				.map(|(_, instance)| instance.clone())
				.collect();
			(state.element.clone(), owned)
		};
		self.behavior().disposed(self);

		for nested in owned {
			nested.dispose();
		}

		let events = {
			let mut state = self.state_mut();
			state.attrs.dispose();
			state.components.clear();
			state.owned.clear();
			state.listeners.clear();
			state.pending_dirty.clear();
			state.parent = None;
			state.events.take()
		};
		drop(events);

		for element_id in self.surface_element_ids() {
			self.context().surfaces().remove_surface(&element_id);
		}
		self.context().instances().remove_component(self.id(), Some(self));

		if let Some(root) = root {
			if let Some(parent) = root.parent_node() {
				if let Err(error) = parent.remove_child(&root) {
					error!(component = %self.id(), "Failed to remove root element: {:?}", error);
				}
			}
		}
		debug!(component = %self.id(), "Disposed.");
	}
}

fn body() -> Result<Element> {
	dom::document()?
		.body()
		.map(Into::into)
		.ok_or_else(|| Error::Dom("document has no body".to_owned()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{attrs::AttrSpec, scheduler::ManualScheduler};
	use core::cell::Cell;
	use serde_json::json;

	#[derive(Default)]
	struct Counted {
		created: Rc<Cell<usize>>,
	}
	impl Component for Counted {
		fn created(&self, _instance: &Instance) {
			self.created.set(self.created.get() + 1);
		}
	}

	fn setup() -> (Rc<ManualScheduler>, Rc<Context>, Rc<Cell<usize>>) {
		let scheduler = Rc::new(ManualScheduler::new());
		let context = Context::new(scheduler.clone());
		let created = Rc::new(Cell::new(0));
		let counter = Rc::clone(&created);
		context
			.register(
				ComponentType::new("Panel", move || Counted { created: Rc::clone(&counter) })
					.attr("title", AttrSpec::new().value("A"))
					.attr("subtitle", AttrSpec::new())
					.surface("header", SurfaceSpec::new().render_attrs(["title", "subtitle"]))
					.surface("body", SurfaceSpec::new()),
			)
			.unwrap();
		(scheduler, context, created)
	}

	#[test]
	fn creation_registers_instance_and_surfaces() {
		let (_, context, created) = setup();
		let panel = context.create("Panel", ComponentConfig::new().id("p")).unwrap();
		let generated = context.create("Panel", ComponentConfig::new()).unwrap();

		assert_eq!(created.get(), 2);
		assert_eq!(panel.lifecycle(), Lifecycle::Created);
		assert_eq!(generated.id(), "c1");
		assert!(context.instances().get_component("p").unwrap().ptr_eq(&panel));
		assert!(context.surfaces().contains("p"));
		assert!(context.surfaces().contains("p-header"));
		assert!(context.surfaces().contains("p-body"));
		assert_eq!(panel.surface_ids(), ["header", "body"]);
		assert_eq!(panel.surface_cache_state("header"), Some(CacheState::NotInitialized));
		assert_eq!(panel.get("title"), Some(json!("A")));
	}

	#[test]
	fn construction_errors() {
		let (_, context, _) = setup();
		assert_eq!(
			context.create("Panel", ComponentConfig::new().attr("content", "<b></b>")).unwrap_err(),
			Error::ReservedAttribute { name: "content".to_owned() }
		);
		assert_eq!(
			context.create("Missing", ComponentConfig::new()).unwrap_err(),
			Error::UnregisteredComponent { name: "Missing".to_owned() }
		);
	}

	#[test]
	fn writes_are_delivered_as_one_batch() {
		let (scheduler, context, _) = setup();
		let panel = context.create("Panel", ComponentConfig::new().attr("title", "X")).unwrap();
		let batches = Rc::new(RefCell::new(Vec::new()));
		let seen = Rc::clone(&batches);
		panel.on_attrs_changed(move |_, batch| seen.borrow_mut().push(batch.clone()));

		panel.set("title", "B").unwrap();
		panel.set("subtitle", "S").unwrap();
		panel.set("title", "C").unwrap();
		assert_eq!(scheduler.pending(), 1);
		assert!(batches.borrow().is_empty());

		assert_eq!(scheduler.flush(), 1);
		let batches = batches.borrow();
		assert_eq!(batches.len(), 1);
		assert_eq!(batches[0].names().collect::<Vec<_>>(), ["title", "subtitle"]);
		assert_eq!(batches[0].get("title").unwrap().prev, json!("X"));
		assert_eq!(batches[0].get("title").unwrap().new, json!("C"));
		assert_eq!(panel.get("title"), Some(json!("C")));
	}

	#[test]
	fn set_attrs_skips_undeclared_keys() {
		let (scheduler, context, _) = setup();
		let panel = context.create("Panel", ComponentConfig::new()).unwrap();
		let Value::Object(values) = json!({ "title": "T", "unknown": 1 }) else { unreachable!() };
		panel.set_attrs(&values).unwrap();
		assert_eq!(panel.get("title"), Some(json!("T")));
		assert_eq!(scheduler.pending(), 1);
		assert!(matches!(panel.set("unknown", 1), Err(Error::UnknownAttribute { .. })));
	}

	#[test]
	fn runtime_surfaces() {
		let (_, context, _) = setup();
		let panel = context.create("Panel", ComponentConfig::new().id("p")).unwrap();
		panel.add_surface("footer", SurfaceSpec::new()).unwrap();
		panel.add_surface("footer", SurfaceSpec::new().render_attrs(["title"])).unwrap();
		assert_eq!(panel.surface_ids(), ["header", "body", "footer"]);
		assert!(context.surfaces().get_surface("p-footer").unwrap().spec().depends_on("title"));
		assert_eq!(
			panel.add_surface(ELEMENT, SurfaceSpec::new()).unwrap_err(),
			Error::ReservedSurface { name: ELEMENT.to_owned() }
		);
		assert!(matches!(
			panel.default_element_content(),
			Content::Html(html) if html == "<!--%surface:header%--><!--%surface:body%--><!--%surface:footer%-->"
		));
	}

	#[test]
	fn dispose_before_render() {
		let (scheduler, context, _) = setup();
		let panel = context.create("Panel", ComponentConfig::new().id("p")).unwrap();
		panel.set("title", "B").unwrap();
		panel.dispose();
		panel.dispose();

		assert!(panel.is_disposed());
		assert!(context.instances().is_empty());
		assert!(context.surfaces().is_empty());
		assert_eq!(panel.set("title", "C").unwrap_err(), Error::Disposed { id: "p".to_owned() });
		assert_eq!(panel.render(None).unwrap_err(), Error::Disposed { id: "p".to_owned() });
		assert_eq!(panel.attach(None).unwrap_err(), Error::Disposed { id: "p".to_owned() });
		assert!(panel.detach().is_ok());

		// The batch opened before disposal still fires, and finds nothing to do.
		assert_eq!(scheduler.flush(), 1);
	}
}
