//! Surface descriptors, content fingerprints and the surface collector.

use core::{
	cell::{Ref, RefCell, RefMut},
	hash::{Hash, Hasher},
};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use tracing::{debug, trace};

/// Local id of the surface whose element is the component's root element.
pub const ELEMENT: &str = "element";

/// The DOM id of a surface's element.
#[must_use]
pub fn element_id(component_id: &str, local_id: &str) -> String {
	if local_id == ELEMENT {
		component_id.to_owned()
	} else {
		format!("{}-{}", component_id, local_id)
	}
}

/// What a content function produced for a surface.
#[derive(Debug, Clone)]
pub enum Content {
	/// Markup, possibly containing [placeholders](crate::placeholder).
	Html(String),
	/// A live node, adopted as-is and never diffed.
	Node(web_sys::Node),
}
impl Content {
	#[must_use]
	pub fn cache_state(&self) -> CacheState {
		match self {
			Self::Html(html) => CacheState::Fingerprint(Fingerprint::of(html)),
			Self::Node(_) => CacheState::NotCacheable,
		}
	}
}
impl From<String> for Content {
	fn from(html: String) -> Self {
		Self::Html(html)
	}
}
impl From<&str> for Content {
	fn from(html: &str) -> Self {
		Self::Html(html.to_owned())
	}
}
impl From<web_sys::Node> for Content {
	fn from(node: web_sys::Node) -> Self {
		Self::Node(node)
	}
}
impl From<web_sys::Element> for Content {
	fn from(element: web_sys::Element) -> Self {
		Self::Node(element.into())
	}
}

/// Hash and length of a content string.
///
/// The hasher uses fixed keys, so equal strings always map to equal fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
	hash: u64,
	len: usize,
}
impl Fingerprint {
	#[must_use]
	pub fn of(content: &str) -> Self {
		let mut hasher = DefaultHasher::new();
		content.hash(&mut hasher);
		Self {
			hash: hasher.finish(),
			len: content.len(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
	#[default]
	NotInitialized,
	NotCacheable,
	Fingerprint(Fingerprint),
}
impl CacheState {
	/// Whether content with cache state `next` has to be committed over content with this one.
	#[must_use]
	pub fn is_dirty(&self, next: &Self) -> bool {
		match (self, next) {
			(Self::Fingerprint(current), Self::Fingerprint(next)) => current != next,
			_ => true,
		}
	}
}

/// Static declaration of a surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceSpec {
	render_attrs: Vec<String>,
	component: Option<String>,
	data: Map<String, Value>,
}
impl SurfaceSpec {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn render_attrs<I>(mut self, names: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<String>,
	{
		self.render_attrs = names.into_iter().map(Into::into).collect();
		self
	}

	/// Binds the surface to a nested component of type `type_name`, whose root element becomes the surface's only content.
	#[must_use]
	pub fn component(mut self, type_name: impl Into<String>) -> Self {
		self.component = Some(type_name.into());
		self
	}

	/// Construction data for a bound component.
	#[must_use]
	pub fn data(mut self, data: Map<String, Value>) -> Self {
		self.data = data;
		self
	}

	#[must_use]
	pub fn render_attr_names(&self) -> &[String] {
		&self.render_attrs
	}

	#[must_use]
	pub fn component_type(&self) -> Option<&str> {
		self.component.as_deref()
	}

	#[must_use]
	pub fn component_data(&self) -> &Map<String, Value> {
		&self.data
	}

	#[must_use]
	pub fn depends_on(&self, attr: &str) -> bool {
		self.render_attrs.iter().any(|name| name == attr)
	}
}

#[derive(Debug)]
pub struct Surface {
	owner: String,
	local_id: String,
	element_id: String,
	spec: SurfaceSpec,
	pub(crate) cache: CacheState,
	pub(crate) element: Option<web_sys::Element>,
	/// Ids of the nested components placed in this surface by its last commit, in order.
	pub(crate) components: Vec<String>,
}
impl Surface {
	#[must_use]
	pub fn new(owner: impl Into<String>, local_id: impl Into<String>, spec: SurfaceSpec) -> Self {
		let owner = owner.into();
		let local_id = local_id.into();
		Self {
			element_id: element_id(&owner, &local_id),
			owner,
			local_id,
			spec,
			cache: CacheState::NotInitialized,
			element: None,
			components: Vec::new(),
		}
	}

	#[must_use]
	pub fn owner(&self) -> &str {
		&self.owner
	}

	#[must_use]
	pub fn local_id(&self) -> &str {
		&self.local_id
	}

	#[must_use]
	pub fn element_id(&self) -> &str {
		&self.element_id
	}

	#[must_use]
	pub fn spec(&self) -> &SurfaceSpec {
		&self.spec
	}

	#[must_use]
	pub fn cache_state(&self) -> CacheState {
		self.cache
	}

	#[must_use]
	pub fn element(&self) -> Option<&web_sys::Element> {
		self.element.as_ref()
	}

	#[must_use]
	pub fn components(&self) -> &[String] {
		&self.components
	}

	pub fn clear_cache(&mut self) {
		self.cache = CacheState::NotInitialized;
	}
}

/// Registry of surfaces by element id.
#[derive(Debug, Default)]
pub struct SurfaceCollector {
	surfaces: RefCell<HashMap<String, Surface>>,
}
impl SurfaceCollector {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `surface` under its element id, replacing any previous registration.
	pub fn add_surface(&self, surface: Surface) {
		let id = surface.element_id().to_owned();
		if self.surfaces.borrow_mut().insert(id.clone(), surface).is_some() {
			debug!(surface = %id, "Replaced existing surface registration.");
		} else {
			trace!(surface = %id, "Added surface.");
		}
	}

	/// # Panics
	///
	/// Iff a mutable borrow of the same collector is live.
	#[must_use]
	pub fn get_surface(&self, element_id: &str) -> Option<Ref<'_, Surface>> {
		Ref::filter_map(self.surfaces.borrow(), |surfaces| surfaces.get(element_id)).ok()
	}

	/// # Panics
	///
	/// Iff any other borrow of the same collector is live.
	#[must_use]
	pub fn get_surface_mut(&self, element_id: &str) -> Option<RefMut<'_, Surface>> {
		RefMut::filter_map(self.surfaces.borrow_mut(), |surfaces| surfaces.get_mut(element_id)).ok()
	}

	pub fn with_surface<R>(&self, element_id: &str, f: impl FnOnce(&Surface) -> R) -> Option<R> {
		self.surfaces.borrow().get(element_id).map(f)
	}

	pub fn with_surface_mut<R>(&self, element_id: &str, f: impl FnOnce(&mut Surface) -> R) -> Option<R> {
		self.surfaces.borrow_mut().get_mut(element_id).map(f)
	}

	#[must_use]
	pub fn contains(&self, element_id: &str) -> bool {
		self.surfaces.borrow().contains_key(element_id)
	}

	/// Removing an absent surface is a no-op.
	pub fn remove_surface(&self, element_id: &str) -> Option<Surface> {
		let removed = self.surfaces.borrow_mut().remove(element_id);
		if removed.is_some() {
			trace!(surface = element_id, "Removed surface.");
		}
		removed
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.surfaces.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.surfaces.borrow().is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fingerprints() {
		assert_eq!(Fingerprint::of("<b>A</b>"), Fingerprint::of(&String::from("<b>A</b>")));
		assert_ne!(Fingerprint::of("<b>A</b>"), Fingerprint::of("<b>B</b>"));
		assert_ne!(Fingerprint::of(""), Fingerprint::of(" "));
	}

	#[test]
	fn dirtiness() {
		let a = Content::from("a").cache_state();
		let b = Content::from("b").cache_state();
		assert!(CacheState::NotInitialized.is_dirty(&a));
		assert!(CacheState::NotCacheable.is_dirty(&a));
		assert!(a.is_dirty(&b));
		assert!(a.is_dirty(&CacheState::NotCacheable));
		assert!(!a.is_dirty(&Content::from(String::from("a")).cache_state()));
	}

	#[test]
	fn element_ids() {
		assert_eq!(element_id("c1", "header"), "c1-header");
		assert_eq!(element_id("c1", ELEMENT), "c1");
		assert_eq!(Surface::new("c1", "header", SurfaceSpec::new()).element_id(), "c1-header");
	}

	#[test]
	fn spec_dependencies() {
		let spec = SurfaceSpec::new().render_attrs(["title", "subtitle"]);
		assert!(spec.depends_on("title"));
		assert!(!spec.depends_on("body"));
		assert!(SurfaceSpec::new().render_attr_names().is_empty());
		assert_eq!(SurfaceSpec::new().component("Button").component_type(), Some("Button"));
	}

	#[test]
	fn collector_is_idempotent() {
		let collector = SurfaceCollector::new();
		collector.add_surface(Surface::new("c1", "header", SurfaceSpec::new()));
		collector.add_surface(Surface::new("c1", "header", SurfaceSpec::new().render_attrs(["title"])));
		assert_eq!(collector.len(), 1);
		assert!(collector.get_surface("c1-header").unwrap().spec().depends_on("title"));

		collector.with_surface_mut("c1-header", |surface| surface.cache = Content::from("x").cache_state());
		assert_ne!(collector.with_surface("c1-header", Surface::cache_state), Some(CacheState::NotInitialized));
		collector.get_surface_mut("c1-header").unwrap().clear_cache();
		assert_eq!(collector.with_surface("c1-header", Surface::cache_state), Some(CacheState::NotInitialized));

		assert!(collector.remove_surface("c1-header").is_some());
		assert!(collector.remove_surface("c1-header").is_none());
		assert!(collector.is_empty());
	}
}
