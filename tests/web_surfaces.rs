#![cfg(target_arch = "wasm32")]

use std::{cell::Cell, rc::Rc, sync::Once};
use surface_dom::{
	AttrSpec, CacheState, Component, ComponentConfig, ComponentType, Content, Context, Instance, ManualScheduler, SurfaceSpec, Write,
};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Element};

wasm_bindgen_test_configure!(run_in_browser);

fn setup() -> (Rc<ManualScheduler>, Rc<Context>) {
	static LOG: Once = Once::new();
	LOG.call_once(tracing_wasm::set_as_global_default);

	let scheduler = Rc::new(ManualScheduler::new());
	let context = Context::new(scheduler.clone());
	(scheduler, context)
}

fn host() -> Element {
	let document = window().unwrap().document().unwrap();
	let host = document.create_element("div").unwrap();
	document.body().unwrap().append_child(&host).unwrap();
	host
}

fn text(element: &Element) -> String {
	element.text_content().unwrap_or_default()
}

struct Header;
impl Component for Header {
	fn surface_content(&self, instance: &Instance, local_id: &str) -> Option<Content> {
		match local_id {
			"header" => Some(instance.get("title")?.as_str()?.into()),
			_ => None,
		}
	}
}

#[wasm_bindgen_test]
fn header_updates_on_next_tick() {
	let (scheduler, context) = setup();
	context
		.register(
			ComponentType::new("Header", || Header)
				.attr("title", AttrSpec::new().value("A"))
				.surface("header", SurfaceSpec::new().render_attrs(["title"])),
		)
		.unwrap();
	let header = context.create("Header", ComponentConfig::new().id("header-example")).unwrap();
	header.render(Some(&host())).unwrap();

	let element = header.surface_element("header").unwrap();
	assert_eq!(element.id(), "header-example-header");
	assert_eq!(text(&element), "A");

	assert_eq!(header.set("title", "B").unwrap(), Write::Queued { opened_batch: true });
	assert_eq!(text(&element), "A");

	scheduler.flush();
	assert_eq!(header.surface_element("header"), Some(element.clone()));
	assert_eq!(text(&element), "B");
}

/// Counts content calls and renders `first` and `last` into one surface.
struct Name {
	calls: Rc<Cell<usize>>,
}
impl Component for Name {
	fn surface_content(&self, instance: &Instance, local_id: &str) -> Option<Content> {
		match local_id {
			"name" => {
				self.calls.set(self.calls.get() + 1);
				let first = instance.get("first")?;
				let last = instance.get("last")?;
				Some(format!("<b>{}</b> {}", first.as_str()?, last.as_str()?).into())
			}
			"empty" => None,
			_ => None,
		}
	}
}

fn register_name(context: &Context) -> Rc<Cell<usize>> {
	let calls = Rc::new(Cell::new(0));
	let factory_calls = Rc::clone(&calls);
	context
		.register(
			ComponentType::new("Name", move || Name { calls: Rc::clone(&factory_calls) })
				.attr("first", AttrSpec::new().value("A"))
				.attr("last", AttrSpec::new().value("B"))
				.attr("unrelated", AttrSpec::new().value(0))
				.surface("name", SurfaceSpec::new().render_attrs(["first", "last"]))
				.surface("empty", SurfaceSpec::new()),
		)
		.unwrap();
	calls
}

#[wasm_bindgen_test]
fn synchronous_writes_resolve_once() {
	let (scheduler, context) = setup();
	let calls = register_name(&context);
	let name = context.create("Name", ComponentConfig::new()).unwrap();
	name.render(Some(&host())).unwrap();
	assert_eq!(calls.get(), 1);

	name.set("first", "C").unwrap();
	name.set("last", "D").unwrap();
	name.set("unrelated", 1).unwrap();
	assert_eq!(calls.get(), 1);

	assert_eq!(scheduler.flush(), 1);
	assert_eq!(calls.get(), 2);
	assert_eq!(text(&name.surface_element("name").unwrap()), "C D");

	name.set("unrelated", 2).unwrap();
	scheduler.flush();
	assert_eq!(calls.get(), 2);
}

#[wasm_bindgen_test]
fn unchanged_content_is_not_rewritten() {
	let (scheduler, context) = setup();
	register_name(&context);
	let name = context.create("Name", ComponentConfig::new()).unwrap();
	name.render(Some(&host())).unwrap();

	let element = name.surface_element("name").unwrap();
	let bold = element.first_child().unwrap();
	let state = name.surface_cache_state("name").unwrap();
	assert!(matches!(state, CacheState::Fingerprint(_)));

	name.render_surface("name").unwrap();
	assert_eq!(element.first_child(), Some(bold.clone()));
	assert_eq!(name.surface_cache_state("name"), Some(state));

	assert_eq!(name.set("first", "A").unwrap(), Write::Unchanged);
	assert_eq!(scheduler.pending(), 0);

	name.clear_surface_cache("name");
	assert_eq!(name.surface_cache_state("name"), Some(CacheState::NotInitialized));
	name.render_surface("name").unwrap();
	assert_ne!(element.first_child(), Some(bold));
	assert_eq!(name.surface_cache_state("name"), Some(state));
	assert_eq!(text(&element), "A B");
}

#[wasm_bindgen_test]
fn missing_content_leaves_surface_alone() {
	let (_, context) = setup();
	register_name(&context);
	let name = context.create("Name", ComponentConfig::new()).unwrap();
	name.render(Some(&host())).unwrap();

	let empty = name.surface_element("empty").unwrap();
	assert_eq!(empty.id(), format!("{}-empty", name.id()));
	assert_eq!(empty.child_nodes().length(), 0);
	assert_eq!(name.surface_cache_state("empty"), Some(CacheState::NotInitialized));

	empty.set_inner_html("<i>external</i>");
	name.render_surface("empty").unwrap();
	assert_eq!(empty.inner_html(), "<i>external</i>");
	assert_eq!(name.render_surface("nonexistent").unwrap(), None);
}

#[wasm_bindgen_test]
fn updates_wait_for_attach() {
	let (scheduler, context) = setup();
	let calls = register_name(&context);
	let name = context.create("Name", ComponentConfig::new()).unwrap();
	name.render(Some(&host())).unwrap();
	name.detach().unwrap();

	name.set("first", "E").unwrap();
	scheduler.flush();
	assert_eq!(calls.get(), 1);
	assert_eq!(text(&name.surface_element("name").unwrap()), "A B");

	name.attach(None).unwrap();
	assert_eq!(calls.get(), 2);
	assert_eq!(text(&name.surface_element("name").unwrap()), "E B");
}

#[wasm_bindgen_test]
fn adopted_surface_root() {
	struct Adopting;
	impl Component for Adopting {
		fn surface_content(&self, instance: &Instance, _: &str) -> Option<Content> {
			Some(format!(r#"<section id="{}-main" class="main">main</section>"#, instance.id()).into())
		}
	}

	let (_, context) = setup();
	context
		.register(ComponentType::new("Adopting", || Adopting).surface("main", SurfaceSpec::new()))
		.unwrap();
	let instance = context.create("Adopting", ComponentConfig::new()).unwrap();
	instance.render(Some(&host())).unwrap();

	let main = instance.surface_element("main").unwrap();
	assert_eq!(main.tag_name(), "SECTION");
	assert_eq!(main.class_name(), "main");
	assert_eq!(main.parent_element(), instance.element());
}

#[wasm_bindgen_test]
fn syncs_and_batch_listeners() {
	let (scheduler, context) = setup();
	let seen = Rc::new(Cell::new(0));
	let synced = Rc::clone(&seen);
	context
		.register(ComponentType::new("Synced", || Header).attr("title", AttrSpec::new().value("A")).sync(
			"title",
			move |instance, new, prev| {
				let element = instance.element().unwrap();
				element.set_attribute("title", new.as_str().unwrap()).unwrap();
				synced.set(synced.get() + usize::from(prev.is_some()) * 10 + 1);
			},
		))
		.unwrap();
	let instance = context.create("Synced", ComponentConfig::new()).unwrap();

	let batches = Rc::new(Cell::new(0));
	let counted = Rc::clone(&batches);
	instance.on_attrs_changed(move |_, batch| {
		assert!(batch.contains("title"));
		counted.set(counted.get() + 1);
	});

	instance.render(Some(&host())).unwrap();
	assert_eq!(seen.get(), 1);
	assert_eq!(instance.element().unwrap().get_attribute("title").as_deref(), Some("A"));

	instance.set("title", "B").unwrap();
	scheduler.flush();
	assert_eq!(seen.get(), 12);
	assert_eq!(batches.get(), 1);
	assert_eq!(instance.element().unwrap().get_attribute("title").as_deref(), Some("B"));
}

/// Renders the whole root element from `title`, including the root's own attributes.
struct Whole;
impl Component for Whole {
	fn element_content(&self, instance: &Instance) -> Option<Content> {
		let title = instance.get("title")?;
		let title = title.as_str()?;
		let html = if title.is_empty() {
			format!(r#"<div id="{}"><h1>untitled</h1></div>"#, instance.id())
		} else {
			format!(r#"<div id="{0}" title="{1}" data-kind="titled"><h1>{1}</h1></div>"#, instance.id(), title)
		};
		Some(html.into())
	}
}

#[wasm_bindgen_test]
fn element_content_follows_its_render_attrs() {
	let (scheduler, context) = setup();
	context
		.register(
			ComponentType::new("Whole", || Whole)
				.attr("title", AttrSpec::new().value("A"))
				.element_render_attrs(["title"])
				.element_class("whole"),
		)
		.unwrap();
	let whole = context.create("Whole", ComponentConfig::new().id("whole-1")).unwrap();
	whole.render(Some(&host())).unwrap();

	let root = whole.element().unwrap();
	assert_eq!(text(&root), "A");
	assert_eq!(root.get_attribute("title").as_deref(), Some("A"));
	assert_eq!(root.get_attribute("data-kind").as_deref(), Some("titled"));
	assert!(root.class_list().contains("whole"));

	whole.set("title", "B").unwrap();
	assert_eq!(text(&root), "A");
	scheduler.flush();
	assert_eq!(whole.element(), Some(root.clone()));
	assert_eq!(text(&root), "B");
	assert_eq!(root.get_attribute("title").as_deref(), Some("B"));

	whole.set("title", "").unwrap();
	scheduler.flush();
	assert_eq!(text(&root), "untitled");
	assert!(!root.has_attribute("title"));
	assert!(!root.has_attribute("data-kind"));
	assert_eq!(root.id(), "whole-1");
	assert_eq!(root.get_attribute("data-component").as_deref(), Some("whole-1"));
	assert!(root.class_list().contains("whole"));
}

/// Produces a new `<strong>` node on every call.
struct Live {
	calls: Rc<Cell<usize>>,
}
impl Component for Live {
	fn surface_content(&self, instance: &Instance, _: &str) -> Option<Content> {
		self.calls.set(self.calls.get() + 1);
		let label = instance.get("label")?;
		let strong = window().unwrap().document().unwrap().create_element("strong").unwrap();
		strong.set_text_content(label.as_str());
		Some(strong.into())
	}
}

#[wasm_bindgen_test]
fn node_content_is_committed_every_time() {
	let (scheduler, context) = setup();
	let calls = Rc::new(Cell::new(0));
	let factory_calls = Rc::clone(&calls);
	context
		.register(
			ComponentType::new("Live", move || Live { calls: Rc::clone(&factory_calls) })
				.attr("label", AttrSpec::new().value("A"))
				.surface("live", SurfaceSpec::new().render_attrs(["label"])),
		)
		.unwrap();
	let live = context.create("Live", ComponentConfig::new()).unwrap();
	live.render(Some(&host())).unwrap();

	let element = live.surface_element("live").unwrap();
	let first = element.first_element_child().unwrap();
	assert_eq!(first.tag_name(), "STRONG");
	assert_eq!(element.parent_element(), live.element());
	assert_eq!(live.surface_cache_state("live"), Some(CacheState::NotCacheable));

	live.render_surface("live").unwrap();
	assert_eq!(calls.get(), 2);
	assert_eq!(live.surface_element("live"), Some(element.clone()));
	assert_ne!(element.first_element_child(), Some(first));
	assert_eq!(element.child_nodes().length(), 1);
	assert_eq!(text(&element), "A");

	live.set("label", "B").unwrap();
	scheduler.flush();
	assert_eq!(calls.get(), 3);
	assert_eq!(text(&element), "B");
	assert_eq!(live.surface_cache_state("live"), Some(CacheState::NotCacheable));
}
