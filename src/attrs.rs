//! Named, validated attribute values and their batched change notifications.
//!
//! Writes are applied immediately but reported lazily: every change made while no batch is
//! pending opens one, further changes coalesce into it, and the owner delivers the whole batch
//! later through its [`Scheduler`](crate::scheduler::Scheduler).

use crate::error::{Error, Result};
use core::fmt::{self, Debug, Formatter};
use hashbrown::{HashMap, HashSet};
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Names that collide with keys the engine interprets itself.
pub const RESERVED_NAMES: &[&str] = &["children", "components", "content", "element", "id"];

#[must_use]
pub fn is_reserved(name: &str) -> bool {
	RESERVED_NAMES.contains(&name)
}

pub type Validator = Rc<dyn Fn(&Value) -> bool>;

/// Declaration of a single attribute.
#[derive(Clone, Default)]
pub struct AttrSpec {
	default: Option<Value>,
	validator: Option<Validator>,
	write_once: bool,
}
impl Debug for AttrSpec {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("AttrSpec")
			.field("default", &self.default)
			.field("validator", &self.validator.as_ref().map(|_| "…"))
			.field("write_once", &self.write_once)
			.finish()
	}
}
impl AttrSpec {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn value(mut self, default: impl Into<Value>) -> Self {
		self.default = Some(default.into());
		self
	}

	#[must_use]
	pub fn validator(mut self, validator: impl Fn(&Value) -> bool + 'static) -> Self {
		self.validator = Some(Rc::new(validator));
		self
	}

	/// The attribute accepts exactly one write: the initial config value if there is one, otherwise the first `set`.
	#[must_use]
	pub fn write_once(mut self) -> Self {
		self.write_once = true;
		self
	}

	#[must_use]
	pub fn default_value(&self) -> Value {
		self.default.clone().unwrap_or(Value::Null)
	}

	#[must_use]
	pub fn accepts(&self, value: &Value) -> bool {
		self.validator.as_ref().map_or(true, |validator| validator(value))
	}

	#[must_use]
	pub fn is_write_once(&self) -> bool {
		self.write_once
	}
}

/// Ordered attribute declarations of one component type.
#[derive(Debug, Clone, Default)]
pub struct AttrTable {
	order: Vec<String>,
	specs: HashMap<String, AttrSpec>,
}
impl AttrTable {
	/// Declares or overrides `name`. Overrides keep the original declaration position.
	pub fn insert(&mut self, name: impl Into<String>, spec: AttrSpec) {
		let name = name.into();
		if self.specs.insert(name.clone(), spec).is_none() {
			self.order.push(name);
		}
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&AttrSpec> {
		self.specs.get(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.order.iter().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrSpec)> {
		self.order.iter().map(move |name| (name.as_str(), &self.specs[name]))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.order.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrChange {
	pub name: String,
	/// The value before the first write of the batch.
	pub prev: Value,
	/// The value after the last write of the batch.
	pub new: Value,
}

/// Coalesced changes, in order of first write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrBatch {
	changes: Vec<AttrChange>,
}
impl AttrBatch {
	fn record(&mut self, name: &str, prev: Value, new: Value) {
		match self.changes.iter_mut().find(|change| change.name == name) {
			Some(change) => change.new = new,
			None => self.changes.push(AttrChange { name: name.to_owned(), prev, new }),
		}
	}

	#[must_use]
	pub fn changes(&self) -> &[AttrChange] {
		&self.changes
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&AttrChange> {
		self.changes.iter().find(|change| change.name == name)
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.changes.iter().map(|change| change.name.as_str())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.changes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.changes.is_empty()
	}
}

/// Outcome of [`AttributeStore::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
	/// The new value equals the current one. Nothing is reported.
	Unchanged,
	/// The validator or write-once rule refused the value. It was logged.
	Rejected,
	/// The value was stored and recorded in the pending batch.
	/// `opened_batch` is `true` iff this write started it, i.e. the batch still has to be scheduled.
	Queued { opened_batch: bool },
}

#[derive(Debug)]
pub struct AttributeStore {
	owner: String,
	table: Rc<AttrTable>,
	values: HashMap<String, Value>,
	written: HashSet<String>,
	pending: Option<AttrBatch>,
	disposed: bool,
}
impl AttributeStore {
	/// Initializes all declared attributes from `initial`, falling back to defaults for missing or invalid values.
	///
	/// # Errors
	///
	/// Iff `initial` contains a [reserved](`RESERVED_NAMES`) key.
	pub fn new(owner: impl Into<String>, table: Rc<AttrTable>, initial: &Map<String, Value>) -> Result<Self> {
		let owner = owner.into();
		if let Some(name) = initial.keys().find(|name| is_reserved(name)) {
			return Err(Error::ReservedAttribute { name: name.clone() });
		}

		let mut values = HashMap::with_capacity(table.len());
		let mut written = HashSet::new();
		for (name, spec) in table.iter() {
			let value = match initial.get(name) {
				Some(value) if spec.accepts(value) => {
					written.insert(name.to_owned());
					value.clone()
				}
				Some(_) => {
					warn!(component = %owner, attribute = name, "Initial value rejected by validator; using the default.");
					spec.default_value()
				}
				None => spec.default_value(),
			};
			values.insert(name.to_owned(), value);
		}
		for name in initial.keys().filter(|name| table.get(name).is_none()) {
			debug!(component = %owner, attribute = %name, "Ignoring undeclared config key.");
		}

		Ok(Self {
			owner,
			table,
			values,
			written,
			pending: None,
			disposed: false,
		})
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.values.get(name)
	}

	#[must_use]
	pub fn table(&self) -> &AttrTable {
		&self.table
	}

	/// # Errors
	///
	/// Iff the store is disposed or `name` isn't declared.
	pub fn set(&mut self, name: &str, value: Value) -> Result<Write> {
		if self.disposed {
			return Err(Error::Disposed { id: self.owner.clone() });
		}
		let spec = self.table.get(name).ok_or_else(|| Error::UnknownAttribute {
			id: self.owner.clone(),
			name: name.to_owned(),
		})?;

		if spec.is_write_once() && self.written.contains(name) {
			warn!(component = %self.owner, attribute = name, "Write-once attribute was already written. Ignoring.");
			return Ok(Write::Rejected);
		}
		if !spec.accepts(&value) {
			if cfg!(feature = "dangerous-logging") {
				warn!(component = %self.owner, attribute = name, ?value, "Value rejected by validator.");
			} else {
				warn!(component = %self.owner, attribute = name, "Value rejected by validator.");
			}
			return Ok(Write::Rejected);
		}
		self.written.insert(name.to_owned());

		let slot = self.values.entry(name.to_owned()).or_insert(Value::Null);
		if *slot == value {
			trace!(component = %self.owner, attribute = name, "Unchanged.");
			return Ok(Write::Unchanged);
		}
		let prev = core::mem::replace(slot, value.clone());

		let opened_batch = self.pending.is_none();
		self.pending.get_or_insert_with(AttrBatch::default).record(name, prev, value);
		Ok(Write::Queued { opened_batch })
	}

	/// Removes and returns the pending batch.
	pub fn take_batch(&mut self) -> Option<AttrBatch> {
		self.pending.take()
	}

	#[must_use]
	pub fn has_pending(&self) -> bool {
		self.pending.is_some()
	}

	/// Drops all values and any pending batch. Later writes fail.
	pub fn dispose(&mut self) {
		self.disposed = true;
		self.values.clear();
		self.pending = None;
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.disposed
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn table() -> Rc<AttrTable> {
		let mut table = AttrTable::default();
		table.insert("title", AttrSpec::new().value("A").validator(Value::is_string));
		table.insert("count", AttrSpec::new().value(0));
		table.insert("key", AttrSpec::new().write_once());
		Rc::new(table)
	}

	fn store(initial: Value) -> AttributeStore {
		let Value::Object(initial) = initial else { unreachable!() };
		AttributeStore::new("c", table(), &initial).unwrap()
	}

	#[test]
	fn defaults_and_initial_values() {
		let store = store(json!({ "count": 3, "title": 5 }));
		assert_eq!(store.get("title"), Some(&json!("A")));
		assert_eq!(store.get("count"), Some(&json!(3)));
		assert_eq!(store.get("key"), Some(&Value::Null));
	}

	#[test]
	fn reserved_config_keys_fail_fast() {
		let Value::Object(initial) = json!({ "children": [] }) else { unreachable!() };
		assert_eq!(
			AttributeStore::new("c", table(), &initial).unwrap_err(),
			Error::ReservedAttribute { name: "children".to_owned() }
		);
	}

	#[test]
	fn writes_coalesce_into_one_batch() {
		let mut store = store(json!({}));
		assert_eq!(store.set("title", json!("B")).unwrap(), Write::Queued { opened_batch: true });
		assert_eq!(store.set("count", json!(1)).unwrap(), Write::Queued { opened_batch: false });
		assert_eq!(store.set("title", json!("C")).unwrap(), Write::Queued { opened_batch: false });

		let batch = store.take_batch().unwrap();
		assert_eq!(batch.len(), 2);
		assert_eq!(
			batch.get("title"),
			Some(&AttrChange {
				name: "title".to_owned(),
				prev: json!("A"),
				new: json!("C"),
			})
		);
		assert_eq!(batch.names().collect::<Vec<_>>(), ["title", "count"]);
		assert!(store.take_batch().is_none());

		assert_eq!(store.set("count", json!(2)).unwrap(), Write::Queued { opened_batch: true });
	}

	#[test]
	fn unchanged_and_rejected_writes_report_nothing() {
		let mut store = store(json!({}));
		assert_eq!(store.set("title", json!("A")).unwrap(), Write::Unchanged);
		assert_eq!(store.set("title", json!(1)).unwrap(), Write::Rejected);
		assert!(!store.has_pending());
		assert_eq!(store.get("title"), Some(&json!("A")));
	}

	#[test]
	fn write_once() {
		let mut store = store(json!({}));
		assert!(matches!(store.set("key", json!("k")).unwrap(), Write::Queued { .. }));
		assert_eq!(store.set("key", json!("l")).unwrap(), Write::Rejected);
		assert_eq!(store.get("key"), Some(&json!("k")));

		let mut store = self::store(json!({ "key": "k" }));
		assert_eq!(store.set("key", json!("l")).unwrap(), Write::Rejected);
	}

	#[test]
	fn unknown_and_disposed() {
		let mut store = store(json!({}));
		assert!(matches!(store.set("nope", json!(1)), Err(Error::UnknownAttribute { .. })));
		store.set("count", json!(1)).unwrap();
		store.dispose();
		assert!(!store.has_pending());
		assert_eq!(store.set("count", json!(2)).unwrap_err(), Error::Disposed { id: "c".to_owned() });
	}
}
