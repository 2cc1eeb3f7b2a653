//! Surface resolution: content production, cache checks, commits and attribute-driven updates.

use crate::{
	attrs::AttrBatch,
	component::Instance,
	dom::{self, Signature, COMPONENT_ATTRIBUTE},
	error::{Error, Result},
	events::{self, EventsCollector},
	nested::{self, Resolution},
	registry::SyncFn,
	surface::{element_id, CacheState, Content, SurfaceSpec, ELEMENT},
};
use hashbrown::HashSet;
use serde_json::Value;
use tracing::{debug, debug_span, error, instrument, trace, warn};
use web_sys::{Document, Element, Node};

/// Builds a fresh root element and resolves every surface into it.
#[instrument(skip(instance), fields(component = %instance.id()))]
pub(crate) fn render_root(instance: &Instance) -> Result<Element> {
	let document = dom::document()?;
	let root = document.create_element(&instance.merged().element_tag).map_err(Error::dom)?;
	setup_root(instance, &root)?;

	resolve_surface(instance, ELEMENT)?;
	for local_id in instance.surface_ids() {
		if instance.surface_element(&local_id).is_none() {
			resolve_surface(instance, &local_id)?;
		}
	}
	Ok(root)
}

/// Adopts `root`, keeping its markup where it matches.
#[instrument(skip(instance, root), fields(component = %instance.id()))]
pub(crate) fn decorate_root(instance: &Instance, root: &Element) -> Result<()> {
	setup_root(instance, root)?;

	decorate_surface(instance, ELEMENT)?;
	for local_id in instance.surface_ids() {
		if instance.surface_element(&local_id).is_none() {
			decorate_surface(instance, &local_id)?;
		}
	}
	Ok(())
}

fn setup_root(instance: &Instance, root: &Element) -> Result<()> {
	root.set_id(instance.id());
	root.set_attribute(COMPONENT_ATTRIBUTE, instance.id()).map_err(Error::dom)?;
	add_element_classes(instance, root)?;

	let element_ids = instance.surface_element_ids();
	let mut events = EventsCollector::new(instance.id(), root.clone());
	for element_id in &element_ids {
		events.add_surface_id(element_id.as_str());
	}
	{
		let mut state = instance.state_mut();
		state.element = Some(root.clone());
		state.events = Some(events);
	}

	let surfaces = instance.context().surfaces();
	for element_id in &element_ids {
		surfaces.with_surface_mut(element_id, |surface| {
			surface.clear_cache();
			if element_id == instance.id() {
				surface.element = Some(root.clone());
			}
		});
	}
	Ok(())
}

fn add_element_classes(instance: &Instance, root: &Element) -> Result<()> {
	let class_list = root.class_list();
	for class in &instance.merged().element_classes {
		class_list.add_1(class).map_err(Error::dom)?;
	}
	Ok(())
}

fn produce(instance: &Instance, local_id: &str) -> Option<Content> {
	let behavior = instance.behavior();
	let content = if local_id == ELEMENT {
		behavior.element_content(instance)
	} else {
		behavior.surface_content(instance, local_id)
	};
	if cfg!(feature = "dangerous-logging") {
		trace!(surface = local_id, ?content, "Produced content.");
	} else {
		match &content {
			Some(Content::Html(html)) => trace!(surface = local_id, len = html.len(), "Produced markup."),
			Some(Content::Node(_)) => trace!(surface = local_id, "Produced a node."),
			None => trace!(surface = local_id, "Produced nothing."),
		}
	}
	content
}

/// Runs `resolve` with the surface's element id unless the surface is already being resolved further up.
fn guarded(instance: &Instance, local_id: &str, resolve: impl FnOnce(&str) -> Result<Option<Element>>) -> Result<Option<Element>> {
	if !instance.state_mut().resolving.insert(local_id.to_owned()) {
		warn!(component = %instance.id(), surface = local_id, "Surface content contains the surface itself. Skipping.");
		return Ok(None);
	}
	let result = resolve(&element_id(instance.id(), local_id));
	instance.state_mut().resolving.remove(local_id);
	result
}

/// Produces the surface's content and commits it iff it's dirty.
///
/// Returns the surface element, or [`None`] iff the surface doesn't exist (anymore).
#[instrument(level = "trace", skip(instance), fields(component = %instance.id()))]
pub(crate) fn resolve_surface(instance: &Instance, local_id: &str) -> Result<Option<Element>> {
	guarded(instance, local_id, |element_id| {
		let Some((spec, cache, existing)) = instance
			.context()
			.surfaces()
			.with_surface(element_id, |surface| (surface.spec().clone(), surface.cache_state(), surface.element().cloned()))
		else {
			trace!("Surface was removed.");
			return Ok(None);
		};

		if let Some(type_name) = spec.component_type() {
			return bind_component(instance, local_id, element_id, &spec, type_name, existing, false);
		}

		let Some(content) = produce(instance, local_id) else {
			return match existing {
				Some(existing) => Ok(Some(existing)),
				None => empty_container(instance, element_id).map(Some),
			};
		};

		let next = content.cache_state();
		if let Some(existing) = existing.as_ref().filter(|_| !cache.is_dirty(&next)) {
			trace!("Cache hit.");
			return Ok(Some(existing.clone()));
		}
		debug!(surface = element_id, ?next, "Cache miss. Committing.");
		commit(instance, local_id, element_id, content, next, existing).map(Some)
	})
}

/// Like [`resolve_surface`], but keeps structurally matching markup that's already in the root element.
#[instrument(level = "trace", skip(instance), fields(component = %instance.id()))]
pub(crate) fn decorate_surface(instance: &Instance, local_id: &str) -> Result<Option<Element>> {
	guarded(instance, local_id, |element_id| {
		let Some(spec) = instance.context().surfaces().with_surface(element_id, |surface| surface.spec().clone()) else {
			trace!("Surface was removed.");
			return Ok(None);
		};
		let root = instance.element().ok_or_else(|| Error::MissingElement { id: instance.id().to_owned() })?;
		let existing = dom::find_by_id(&root, element_id);

		if let Some(type_name) = spec.component_type() {
			return bind_component(instance, local_id, element_id, &spec, type_name, existing, true);
		}

		let Some(content) = produce(instance, local_id) else {
			return match existing {
				Some(existing) => {
					bind_events(instance, &existing, element_id);
					store(instance, element_id, CacheState::NotInitialized, &existing, Vec::new());
					Ok(Some(existing))
				}
				None => empty_container(instance, element_id).map(Some),
			};
		};

		let next = content.cache_state();
		if let (Content::Html(html), Some(existing)) = (&content, &existing) {
			let fragment = dom::parse_html(&dom::document()?, html)?;
			let adopted = dom::sole_element_with_id(&fragment, element_id);
			let fresh = match (&adopted, local_id == ELEMENT) {
				(Some(adopted), _) => Signature::of(adopted),
				(None, true) => Signature::of(existing),
				(None, false) => Signature::new(&instance.merged().surface_tag, element_id),
			};
			let current = Signature::of(existing);

			if fresh == current {
				let scope: Node = match adopted {
					Some(adopted) => adopted.into(),
					None => fragment.into(),
				};
				let mut resolution = Resolution::new(element_id);
				if nested::decorate_placeholders(instance, &scope, existing, &mut resolution)? {
					trace!(surface = element_id, "Keeping existing markup.");
					bind_events(instance, existing, element_id);
					store(instance, element_id, next, existing, resolution.placed);
					return Ok(Some(existing.clone()));
				}
				debug!(surface = element_id, "Existing markup lacks a nested component. Rewriting.");
			} else {
				debug!(surface = element_id, ?current, ?fresh, "Existing markup differs structurally. Rewriting.");
			}
		}
		commit(instance, local_id, element_id, content, next, existing).map(Some)
	})
}

fn empty_container(instance: &Instance, element_id: &str) -> Result<Element> {
	let container = dom::document()?.create_element(&instance.merged().surface_tag).map_err(Error::dom)?;
	container.set_id(element_id);
	instance.context().surfaces().with_surface_mut(element_id, |surface| surface.element = Some(container.clone()));
	Ok(container)
}

/// The element that receives non-adopted content.
fn container(instance: &Instance, document: &Document, local_id: &str, element_id: &str, existing: Option<Element>) -> Result<Element> {
	if local_id == ELEMENT {
		return existing.ok_or_else(|| Error::MissingElement { id: instance.id().to_owned() });
	}
	let tag = &instance.merged().surface_tag;
	match existing {
		Some(existing) if existing.tag_name().eq_ignore_ascii_case(tag) => Ok(existing),
		existing => {
			let container = document.create_element(tag).map_err(Error::dom)?;
			container.set_id(element_id);
			if let Some(existing) = existing {
				dom::replace_in_place(&existing, &container)?;
			}
			Ok(container)
		}
	}
}

/// Writes dirty content: resolves its placeholders, installs it and rebinds its events.
fn commit(instance: &Instance, local_id: &str, element_id: &str, content: Content, next: CacheState, existing: Option<Element>) -> Result<Element> {
	let document = dom::document()?;
	let mut resolution = Resolution::new(element_id);

	let element = match content {
		Content::Html(html) => {
			let fragment = dom::parse_html(&document, &html)?;
			if let Some(adopted) = dom::sole_element_with_id(&fragment, element_id) {
				nested::resolve_placeholders(instance, &adopted, &mut resolution)?;
				if local_id == ELEMENT {
					let root = existing.ok_or_else(|| Error::MissingElement { id: instance.id().to_owned() })?;
					dom::sync_attributes(&adopted, &root, &["id", COMPONENT_ATTRIBUTE])?;
					add_element_classes(instance, &root)?;
					dom::clear_children(&root)?;
					dom::move_children(&adopted, &root)?;
					root
				} else {
					if let Some(existing) = &existing {
						dom::replace_in_place(existing, &adopted)?;
					}
					adopted
				}
			} else {
				nested::resolve_placeholders(instance, &fragment, &mut resolution)?;
				let container = container(instance, &document, local_id, element_id, existing)?;
				dom::clear_children(&container)?;
				dom::move_children(&fragment, &container)?;
				container
			}
		}
		Content::Node(node) => {
			nested::resolve_placeholders(instance, &node, &mut resolution)?;
			let container = container(instance, &document, local_id, element_id, existing)?;
			dom::clear_children(&container)?;
			container.append_child(&node).map_err(Error::dom)?;
			container
		}
	};

	bind_events(instance, &element, element_id);
	store(instance, element_id, next, &element, resolution.placed);
	Ok(element)
}

/// Resolves the nested component a surface is bound to and makes its root element the surface's only content.
fn bind_component(
	instance: &Instance,
	local_id: &str,
	element_id: &str,
	spec: &SurfaceSpec,
	type_name: &str,
	existing: Option<Element>,
	decorating: bool,
) -> Result<Option<Element>> {
	let mut resolution = Resolution::new(element_id);
	let data = spec.component_data().clone();
	let id = nested::target_id(None, &data, type_name, &mut resolution);
	let markup = existing.as_ref().filter(|_| decorating).and_then(|existing| dom::find_by_id(existing, &id));
	let Some(root) = nested::resolve_component(instance, id, type_name, data, &mut resolution, markup)? else {
		return Ok(existing);
	};

	let container = container(instance, &dom::document()?, local_id, element_id, existing)?;
	let root_node: &Node = root.as_ref();
	let in_place = container.child_nodes().length() == 1 && container.first_child().map_or(false, |child| child.is_same_node(Some(root_node)));
	if !in_place {
		dom::clear_children(&container)?;
		container.append_child(&root).map_err(Error::dom)?;
	}
	store(instance, element_id, CacheState::NotCacheable, &container, resolution.placed);
	Ok(Some(container))
}

/// Records a commit and releases nested components it dropped.
fn store(instance: &Instance, element_id: &str, cache: CacheState, element: &Element, placed: Vec<String>) {
	let previous = instance
		.context()
		.surfaces()
		.with_surface_mut(element_id, |surface| {
			surface.cache = cache;
			surface.element = Some(element.clone());
			core::mem::replace(&mut surface.components, placed)
		})
		.unwrap_or_default();
	release_dropped(instance, previous);
}

/// Disposes owned nested components that no surface of `instance` places anymore. Others only leave the document.
fn release_dropped(instance: &Instance, previous: Vec<String>) {
	if previous.is_empty() {
		return;
	}
	let surfaces = instance.context().surfaces();
	let still_placed: HashSet<String> = instance
		.surface_element_ids()
		.iter()
		.filter_map(|element_id| surfaces.with_surface(element_id, |surface| surface.components().to_vec()))
		.flatten()
		.collect();

	for id in previous.into_iter().filter(|id| !still_placed.contains(id)) {
		let (nested, owned) = {
			let mut state = instance.state_mut();
			let nested = state.components.remove(&id);
			let nested = nested.or_else(|| state.children.iter().find(|child| child.id() == id).cloned());
			(nested, state.owned.remove(&id))
		};
		match nested {
			Some(nested) if owned => {
				debug!(component = %instance.id(), nested = %id, "Disposing unused nested component.");
				nested.dispose();
			}
			Some(nested) => nested.leave_document(),
			None => (),
		}
	}
}

fn bind_events(instance: &Instance, element: &Element, group: &str) {
	let resolve = events::resolver(instance);
	if let Some(events) = instance.state_mut().events.as_mut() {
		events.attach_listeners(element, group, &resolve);
	}
}

/// Rescans every rendered surface, e.g. after the listeners were released on detach.
pub(crate) fn rebind_all(instance: &Instance) {
	for element_id in instance.surface_element_ids() {
		let element = instance.context().surfaces().with_surface(&element_id, |surface| surface.element().cloned()).flatten();
		if let Some(element) = element {
			bind_events(instance, &element, &element_id);
		}
	}
}

/// Runs sync callbacks: for every attribute with its current value, or for the changes in `batch`.
pub(crate) fn run_syncs(instance: &Instance, batch: Option<&AttrBatch>) {
	let merged = instance.merged();
	if merged.syncs.is_empty() {
		return;
	}
	let calls: Vec<(SyncFn, Value, Option<Value>)> = match batch {
		None => {
			let state = instance.state();
			merged
				.attrs
				.names()
				.filter_map(|name| Some((merged.syncs.get(name)?.clone(), state.attrs.get(name)?.clone(), None)))
				.collect()
		}
		Some(batch) => batch
			.changes()
			.iter()
			.filter_map(|change| Some((merged.syncs.get(&change.name)?.clone(), change.new.clone(), Some(change.prev.clone()))))
			.collect(),
	};
	for (sync, new, prev) in calls {
		sync(instance, &new, prev.as_ref());
	}
}

/// Delivers the pending attribute batch, if any, and re-resolves the surfaces depending on it.
pub(crate) fn flush(instance: &Instance) {
	let span = debug_span!("flush", component = %instance.id());
	let _enter = span.enter();

	let (batch, listeners) = {
		let mut state = instance.state_mut();
		let Some(batch) = state.attrs.take_batch() else {
			trace!("Nothing to deliver.");
			return;
		};
		(batch, state.listeners.clone())
	};
	debug!(changes = batch.len(), "Delivering attribute batch.");

	for listener in listeners {
		listener(instance, &batch);
	}
	if !instance.is_rendered() {
		return;
	}
	run_syncs(instance, Some(&batch));
	if !instance.is_rendered() {
		return;
	}

	let surfaces = instance.context().surfaces();
	let dirty: Vec<String> = core::iter::once(ELEMENT.to_owned())
		.chain(instance.surface_ids())
		.filter(|local_id| {
			surfaces
				.with_surface(&element_id(instance.id(), local_id), |surface| batch.names().any(|name| surface.spec().depends_on(name)))
				.unwrap_or(false)
		})
		.collect();
	if dirty.is_empty() {
		return;
	}

	if !instance.in_document() {
		trace!(?dirty, "Out of the document. Deferring.");
		let mut state = instance.state_mut();
		for local_id in dirty {
			if !state.pending_dirty.contains(&local_id) {
				state.pending_dirty.push(local_id);
			}
		}
		return;
	}

	for local_id in dirty {
		if let Err(error) = resolve_surface(instance, &local_id) {
			error!(surface = %local_id, "Surface update failed: {}", error);
		}
	}
	instance.enter_nested();
}
