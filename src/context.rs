//! The registries and scheduler one "application" shares.

use crate::{
	component::Instance,
	config::ComponentConfig,
	error::Result,
	registry::{ComponentCollector, ComponentRegistry, ComponentType},
	scheduler::{MicrotaskScheduler, Scheduler},
	surface::SurfaceCollector,
};
use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::instrument;

thread_local! {
	static GLOBAL: Rc<Context> = Context::new(Rc::new(MicrotaskScheduler));
}

/// Lookups within one context are consistent; instances of different contexts never see each other.
///
/// Live instances are held by their context until they are [disposed](`Instance::dispose`).
pub struct Context {
	components: ComponentRegistry,
	instances: ComponentCollector,
	surfaces: SurfaceCollector,
	scheduler: Rc<dyn Scheduler>,
	next_id: Cell<u64>,
}
impl Debug for Context {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("components", &self.components)
			.field("instances", &self.instances.ids())
			.field("surfaces", &self.surfaces.len())
			.finish_non_exhaustive()
	}
}
impl Context {
	#[must_use]
	pub fn new(scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
		Rc::new(Self {
			components: ComponentRegistry::new(),
			instances: ComponentCollector::new(),
			surfaces: SurfaceCollector::new(),
			scheduler,
			next_id: Cell::new(0),
		})
	}

	/// The thread's default context, which delivers attribute batches as microtasks.
	#[must_use]
	pub fn global() -> Rc<Self> {
		GLOBAL.with(Rc::clone)
	}

	#[must_use]
	pub fn components(&self) -> &ComponentRegistry {
		&self.components
	}

	#[must_use]
	pub fn instances(&self) -> &ComponentCollector {
		&self.instances
	}

	#[must_use]
	pub fn surfaces(&self) -> &SurfaceCollector {
		&self.surfaces
	}

	#[must_use]
	pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
		&self.scheduler
	}

	/// Shorthand for [`ComponentRegistry::register`].
	///
	/// # Errors
	///
	/// Iff the type fails validation.
	pub fn register(&self, component_type: ComponentType) -> Result<Rc<ComponentType>> {
		self.components.register(component_type)
	}

	/// Instantiates the type registered as `type_name`.
	///
	/// # Errors
	///
	/// Iff the type isn't registered or `config` uses a reserved attribute name.
	#[instrument(skip(self, config))]
	pub fn create(self: &Rc<Self>, type_name: &str, config: ComponentConfig) -> Result<Instance> {
		let component_type = self.components.get_constructor(type_name)?;
		Instance::new(component_type, config, Rc::clone(self))
	}

	/// A fresh instance id that's not currently in use.
	pub(crate) fn generate_id(&self) -> String {
		loop {
			let n = self.next_id.get() + 1;
			self.next_id.set(n);
			let id = format!("c{}", n);
			if self.instances.get_component(&id).is_none() {
				return id;
			}
		}
	}
}
