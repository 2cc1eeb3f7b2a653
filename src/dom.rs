//! Thin helpers over `web_sys` used by the render engine.

use crate::{
	error::{Error, Result},
	placeholder::{Placeholder, PlaceholderError},
};
use wasm_bindgen::JsCast;
use web_sys::{Comment, Document, DocumentFragment, Element, HtmlTemplateElement, Node, NodeList};

/// Marks a component's root element with the component id.
pub const COMPONENT_ATTRIBUTE: &str = "data-component";

pub fn document() -> Result<Document> {
	web_sys::window()
		.and_then(|window| window.document())
		.ok_or_else(|| Error::Dom("no global document".to_owned()))
}

/// Parses `html` into an inert, detached fragment.
pub fn parse_html(document: &Document, html: &str) -> Result<DocumentFragment> {
	let template: HtmlTemplateElement = document
		.create_element("template")
		.map_err(Error::dom)?
		.dyn_into()
		.map_err(|element| Error::Dom(format!("expected <template>, got {:?}", element)))?;
	template.set_inner_html(html);
	Ok(template.content())
}

pub fn nodes(list: &NodeList) -> impl Iterator<Item = Node> + '_ {
	(0..list.length()).filter_map(move |i| list.get(i))
}

/// Child nodes other than whitespace-only text and ordinary comments.
pub fn significant_children(parent: &Node) -> Vec<Node> {
	nodes(&parent.child_nodes())
		.filter(|node| match node.node_type() {
			Node::TEXT_NODE => node.text_content().map_or(false, |text| !text.trim().is_empty()),
			Node::COMMENT_NODE => node
				.dyn_ref::<Comment>()
				.map_or(false, |comment| Placeholder::from_comment(&comment.data()).is_some()),
			_ => true,
		})
		.collect()
}

/// The only significant child of `parent`, iff it's an element with the given id.
pub fn sole_element_with_id(parent: &Node, id: &str) -> Option<Element> {
	match significant_children(parent).as_slice() {
		[node] => node.dyn_ref::<Element>().filter(|element| element.id() == id).cloned(),
		_ => None,
	}
}

/// All placeholder comments below `root`, in document order.
pub fn placeholder_comments(root: &Node) -> Vec<(Comment, Result<Placeholder, PlaceholderError>)> {
	fn walk(node: &Node, found: &mut Vec<(Comment, Result<Placeholder, PlaceholderError>)>) {
		for child in nodes(&node.child_nodes()) {
			match child.node_type() {
				Node::COMMENT_NODE => {
					if let Some(comment) = child.dyn_ref::<Comment>() {
						if let Some(placeholder) = Placeholder::from_comment(&comment.data()) {
							found.push((comment.clone(), placeholder));
						}
					}
				}
				Node::ELEMENT_NODE => walk(&child, found),
				_ => (),
			}
		}
	}

	let mut found = Vec::new();
	walk(root, &mut found);
	found
}

pub fn clear_children(parent: &Node) -> Result<()> {
	while let Some(child) = parent.first_child() {
		parent.remove_child(&child).map_err(Error::dom)?;
	}
	Ok(())
}

/// `element` followed by all its descendant elements, in document order.
pub fn elements_inclusive(element: &Element) -> Result<Vec<Element>> {
	let descendants = element.query_selector_all("*").map_err(Error::dom)?;
	let mut elements = Vec::with_capacity(descendants.length() as usize + 1);
	elements.push(element.clone());
	elements.extend(nodes(&descendants).filter_map(|node| node.dyn_into::<Element>().ok()));
	Ok(elements)
}

/// `root` itself or its first descendant with the given id. Works on detached trees.
pub fn find_by_id(root: &Element, id: &str) -> Option<Element> {
	if root.id() == id {
		return Some(root.clone());
	}
	let selector = format!("[id=\"{}\"]", id.replace('\\', "\\\\").replace('"', "\\\""));
	root.query_selector(&selector).ok().flatten()
}

/// Lowercase tag name and id, which decide whether existing markup can be kept when decorating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
	pub tag: String,
	pub id: String,
}
impl Signature {
	pub fn new(tag: &str, id: &str) -> Self {
		Self {
			tag: tag.to_ascii_lowercase(),
			id: id.to_owned(),
		}
	}

	pub fn of(element: &Element) -> Self {
		Self::new(&element.tag_name(), &element.id())
	}
}

/// Makes the attributes of `to` equal to those of `from`, except for the names in `keep`, which stay untouched.
pub fn sync_attributes(from: &Element, to: &Element, keep: &[&str]) -> Result<()> {
	let names = |element: &Element| -> Vec<String> { element.get_attribute_names().iter().filter_map(|name| name.as_string()).collect() };
	let wanted = names(from);
	for stale in names(to).iter().filter(|name| !wanted.contains(name) && !keep.contains(&name.as_str())) {
		to.remove_attribute(stale).map_err(Error::dom)?;
	}
	for name in wanted.iter().filter(|name| !keep.contains(&name.as_str())) {
		if let Some(value) = from.get_attribute(name) {
			to.set_attribute(name, &value).map_err(Error::dom)?;
		}
	}
	Ok(())
}

/// Moves all child nodes of `from` to the end of `to`.
pub fn move_children(from: &Node, to: &Node) -> Result<()> {
	while let Some(child) = from.first_child() {
		to.append_child(&child).map_err(Error::dom)?;
	}
	Ok(())
}

/// Puts `new` where `old` is, iff `old` has a parent and the two differ.
pub fn replace_in_place(old: &Element, new: &Element) -> Result<()> {
	if old != new && old.parent_node().is_some() {
		old.replace_with_with_node_1(new).map_err(Error::dom)?;
	}
	Ok(())
}

/// Replaces `comment` with `nodes`, in order.
pub fn replace_comment(comment: &Comment, nodes: &[Node]) -> Result<()> {
	let Some(parent) = comment.parent_node() else {
		return Ok(());
	};
	let anchor: &Node = comment.as_ref();
	for node in nodes {
		parent.insert_before(node, Some(anchor)).map_err(Error::dom)?;
	}
	parent.remove_child(comment).map_err(Error::dom)?;
	Ok(())
}
