use crate::events::BindingKey;
use hashbrown::HashSet;

/// Scratch set for the declarations found by one scan, reused across scans to keep its allocation.
#[derive(Debug, Default)]
pub struct TempBindingSet(HashSet<BindingKey>);
impl TempBindingSet {
	pub fn new() -> Self {
		Self(HashSet::new())
	}

	/// Clears the set and lends it out.
	pub fn temp(&mut self) -> &mut HashSet<BindingKey> {
		self.0.clear();
		&mut self.0
	}

	/// Retrieves the cache set's capacity without clearing it first.
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}
