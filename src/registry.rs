//! Component types, the registry resolving them by name, and the collector of live instances.

use crate::{
	attrs::{is_reserved, AttrSpec, AttrTable},
	component::{Component, Instance},
	error::{Error, Result},
	surface::{SurfaceSpec, ELEMENT},
};
use core::{
	cell::{OnceCell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, trace};

/// A named DOM event handler.
pub type Handler = Rc<dyn Fn(&Instance, &web_sys::Event)>;

/// Called with `(instance, new, prev)` when an attribute is synchronized. `prev` is [`None`] on the initial sync.
pub type SyncFn = Rc<dyn Fn(&Instance, &Value, Option<&Value>)>;

pub type Factory = Rc<dyn Fn() -> Rc<dyn Component>>;

const DEFAULT_TAG: &str = "div";

/// Declaration of a component type.
///
/// Declarations of an [`extends`](`ComponentType::extends`) chain are merged once, on first use, with
/// the more derived type winning per name.
pub struct ComponentType {
	name: String,
	factory: Factory,
	parent: Option<Rc<ComponentType>>,
	attrs: AttrTable,
	surfaces: Vec<(String, SurfaceSpec)>,
	handlers: HashMap<String, Handler>,
	syncs: HashMap<String, SyncFn>,
	element_tag: Option<String>,
	surface_tag: Option<String>,
	element_classes: Vec<String>,
	element_render_attrs: Vec<String>,
	merged: OnceCell<Rc<Merged>>,
}
impl Debug for ComponentType {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentType")
			.field("name", &self.name)
			.field("parent", &self.parent.as_ref().map(|parent| &parent.name))
			.field("attrs", &self.attrs)
			.field("surfaces", &self.surfaces)
			.field("handlers", &self.handlers.keys().collect::<Vec<_>>())
			.field("syncs", &self.syncs.keys().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

/// The effective declarations of a type, including everything inherited.
pub struct Merged {
	pub attrs: Rc<AttrTable>,
	pub surfaces: Vec<(String, SurfaceSpec)>,
	pub handlers: HashMap<String, Handler>,
	pub syncs: HashMap<String, SyncFn>,
	pub element_tag: String,
	pub surface_tag: String,
	pub element_classes: Vec<String>,
	/// Attributes whose change re-resolves the root element's own content.
	pub element_render_attrs: Vec<String>,
}
impl Debug for Merged {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Merged")
			.field("attrs", &self.attrs)
			.field("surfaces", &self.surfaces)
			.field("handlers", &self.handlers.keys().collect::<Vec<_>>())
			.field("syncs", &self.syncs.keys().collect::<Vec<_>>())
			.field("element_tag", &self.element_tag)
			.field("surface_tag", &self.surface_tag)
			.field("element_classes", &self.element_classes)
			.field("element_render_attrs", &self.element_render_attrs)
			.finish()
	}
}
impl Merged {
	#[must_use]
	pub fn surface(&self, local_id: &str) -> Option<&SurfaceSpec> {
		self.surfaces.iter().find(|(id, _)| id == local_id).map(|(_, spec)| spec)
	}
}

impl ComponentType {
	pub fn new<C: Component>(name: impl Into<String>, factory: impl Fn() -> C + 'static) -> Self {
		Self {
			name: name.into(),
			factory: Rc::new(move || Rc::new(factory()) as Rc<dyn Component>),
			parent: None,
			attrs: AttrTable::default(),
			surfaces: Vec::new(),
			handlers: HashMap::new(),
			syncs: HashMap::new(),
			element_tag: None,
			surface_tag: None,
			element_classes: Vec::new(),
			element_render_attrs: Vec::new(),
			merged: OnceCell::new(),
		}
	}

	#[must_use]
	pub fn extends(mut self, parent: Rc<ComponentType>) -> Self {
		self.parent = Some(parent);
		self
	}

	#[must_use]
	pub fn attr(mut self, name: impl Into<String>, spec: AttrSpec) -> Self {
		self.attrs.insert(name, spec);
		self
	}

	#[must_use]
	pub fn surface(mut self, local_id: impl Into<String>, spec: SurfaceSpec) -> Self {
		insert_ordered(&mut self.surfaces, local_id.into(), spec);
		self
	}

	#[must_use]
	pub fn handler(mut self, name: impl Into<String>, handler: impl Fn(&Instance, &web_sys::Event) + 'static) -> Self {
		self.handlers.insert(name.into(), Rc::new(handler));
		self
	}

	#[must_use]
	pub fn sync(mut self, attr: impl Into<String>, sync: impl Fn(&Instance, &Value, Option<&Value>) + 'static) -> Self {
		self.syncs.insert(attr.into(), Rc::new(sync));
		self
	}

	#[must_use]
	pub fn element_tag(mut self, tag: impl Into<String>) -> Self {
		self.element_tag = Some(tag.into());
		self
	}

	#[must_use]
	pub fn surface_tag(mut self, tag: impl Into<String>) -> Self {
		self.surface_tag = Some(tag.into());
		self
	}

	/// Declares the attributes [`Component::element_content`] depends on. Adds to inherited ones.
	#[must_use]
	pub fn element_render_attrs<I>(mut self, names: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<String>,
	{
		self.element_render_attrs.extend(names.into_iter().map(Into::into));
		self
	}

	#[must_use]
	pub fn element_class(mut self, class: impl Into<String>) -> Self {
		self.element_classes.push(class.into());
		self
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn parent(&self) -> Option<&Rc<ComponentType>> {
		self.parent.as_ref()
	}

	pub(crate) fn instantiate(&self) -> Rc<dyn Component> {
		(self.factory)()
	}

	/// Whether this type is `name` or extends it.
	#[must_use]
	pub fn is(&self, name: &str) -> bool {
		self.name == name || self.parent.as_ref().map_or(false, |parent| parent.is(name))
	}

	/// The declarations of this type merged with those of its ancestors. Computed once.
	pub fn merged(&self) -> Rc<Merged> {
		Rc::clone(self.merged.get_or_init(|| {
			trace!(component_type = %self.name, "Merging declarations.");
			let (mut attrs, mut surfaces, mut handlers, mut syncs, inherited_tags, mut element_classes, mut element_render_attrs) = match &self.parent {
				Some(parent) => {
					let parent = parent.merged();
					(
						(*parent.attrs).clone(),
						parent.surfaces.clone(),
						parent.handlers.clone(),
						parent.syncs.clone(),
						Some((parent.element_tag.clone(), parent.surface_tag.clone())),
						parent.element_classes.clone(),
						parent.element_render_attrs.clone(),
					)
				}
				None => Default::default(),
			};

			for (name, spec) in self.attrs.iter() {
				attrs.insert(name, spec.clone());
			}
			for (local_id, spec) in &self.surfaces {
				insert_ordered(&mut surfaces, local_id.clone(), spec.clone());
			}
			handlers.extend(self.handlers.iter().map(|(k, v)| (k.clone(), Rc::clone(v))));
			syncs.extend(self.syncs.iter().map(|(k, v)| (k.clone(), Rc::clone(v))));
			for class in &self.element_classes {
				if !element_classes.contains(class) {
					element_classes.push(class.clone());
				}
			}
			for name in &self.element_render_attrs {
				if !element_render_attrs.contains(name) {
					element_render_attrs.push(name.clone());
				}
			}

			let (inherited_element_tag, inherited_surface_tag) = inherited_tags.unwrap_or_else(|| (DEFAULT_TAG.to_owned(), DEFAULT_TAG.to_owned()));
			Rc::new(Merged {
				attrs: Rc::new(attrs),
				surfaces,
				handlers,
				syncs,
				element_tag: self.element_tag.clone().unwrap_or(inherited_element_tag),
				surface_tag: self.surface_tag.clone().unwrap_or(inherited_surface_tag),
				element_classes,
				element_render_attrs,
			})
		}))
	}

	/// # Errors
	///
	/// Iff a declared attribute or surface uses a reserved name.
	pub fn validate(&self) -> Result<()> {
		let merged = self.merged();
		if let Some(name) = merged.attrs.names().find(|name| is_reserved(name)) {
			return Err(Error::ReservedAttribute { name: name.to_owned() });
		}
		if merged.surfaces.iter().any(|(local_id, _)| local_id == ELEMENT) {
			return Err(Error::ReservedSurface { name: ELEMENT.to_owned() });
		}
		Ok(())
	}
}

fn insert_ordered(surfaces: &mut Vec<(String, SurfaceSpec)>, local_id: String, spec: SurfaceSpec) {
	match surfaces.iter_mut().find(|(id, _)| *id == local_id) {
		Some((_, existing)) => *existing = spec,
		None => surfaces.push((local_id, spec)),
	}
}

/// Component types by name.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
	types: RefCell<HashMap<String, Rc<ComponentType>>>,
}
impl ComponentRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `component_type` under its name. Registering a name again replaces the previous type.
	///
	/// # Errors
	///
	/// Iff the type [fails validation](`ComponentType::validate`).
	pub fn register(&self, component_type: ComponentType) -> Result<Rc<ComponentType>> {
		let component_type = Rc::new(component_type);
		self.register_rc(Rc::clone(&component_type))?;
		Ok(component_type)
	}

	/// # Errors
	///
	/// Iff the type [fails validation](`ComponentType::validate`).
	pub fn register_rc(&self, component_type: Rc<ComponentType>) -> Result<()> {
		component_type.validate()?;
		let name = component_type.name().to_owned();
		if self.types.borrow_mut().insert(name.clone(), component_type).is_some() {
			debug!(component_type = %name, "Replaced registered component type.");
		}
		Ok(())
	}

	/// # Errors
	///
	/// Iff no type is registered as `name`.
	pub fn get_constructor(&self, name: &str) -> Result<Rc<ComponentType>> {
		self.types.borrow().get(name).cloned().ok_or_else(|| Error::UnregisteredComponent { name: name.to_owned() })
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.types.borrow().contains_key(name)
	}
}

/// Live component instances by id.
#[derive(Debug, Default)]
pub struct ComponentCollector {
	instances: RefCell<HashMap<String, Instance>>,
}
impl ComponentCollector {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_component(&self, instance: Instance) {
		let id = instance.id().to_owned();
		let previous = self.instances.borrow_mut().insert(id.clone(), instance.clone());
		if previous.map_or(false, |previous| !previous.ptr_eq(&instance)) {
			debug!(component = %id, "Replaced a different instance registered under the same id.");
		}
	}

	#[must_use]
	pub fn get_component(&self, id: &str) -> Option<Instance> {
		self.instances.borrow().get(id).cloned()
	}

	/// Removes `id` if it's registered to `instance` (or to anything, if `instance` is [`None`]).
	pub fn remove_component(&self, id: &str, instance: Option<&Instance>) -> Option<Instance> {
		let mut instances = self.instances.borrow_mut();
		match (instances.get(id), instance) {
			(Some(registered), Some(instance)) if !registered.ptr_eq(instance) => None,
			(Some(_), _) => instances.remove(id),
			(None, _) => None,
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.instances.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.instances.borrow().is_empty()
	}

	#[must_use]
	pub fn ids(&self) -> Vec<String> {
		self.instances.borrow().keys().cloned().collect()
	}
}
