//! Reference-counted values keyed by name, used for the one DOM listener per event type that many
//! bindings share.

use core::{
	borrow::Borrow,
	fmt::{self, Debug, Formatter},
	hash::{BuildHasher, Hash},
};
use hashbrown::{hash_map::Entry, DefaultHashBuilder, HashMap};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};

struct Counted<C, V> {
	count: C,
	value: V,
}

/// A map whose entries carry a reference count.
///
/// Decrementing never removes an entry by itself. Entries that reached zero ("weak" entries) are
/// collected with [`drain_weak`](`RcHashMap::drain_weak`), so an entry released and re-acquired
/// during one rescan keeps its value.
pub struct RcHashMap<K, C, V, S = DefaultHashBuilder> {
	entries: HashMap<K, Counted<C, V>, S>,
}
impl<K, C, V, S> Default for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K: Debug, C: Debug, V, S> Debug for RcHashMap<K, C, V, S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.entries.iter().map(|(key, entry)| (key, &entry.count))).finish()
	}
}
impl<K, C, V, S> RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self {
			entries: HashMap::with_hasher(S::default()),
		}
	}

	/// Acquires `key`, creating its value from the key on first use (or after it was drained).
	///
	/// # Errors
	///
	/// Iff the count would overflow `C`. The count is left unchanged in that case.
	pub fn increment_or_insert_with<F: FnOnce(&K) -> V>(&mut self, key: K, create: F) -> Result<&mut V, CountSaturatedError> {
		match self.entries.entry(key) {
			Entry::Occupied(occupied) => {
				let entry = occupied.into_mut();
				entry.count = entry.count.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(&mut entry.value)
			}
			Entry::Vacant(vacant) => {
				let value = create(vacant.key());
				Ok(&mut vacant.insert(Counted { count: C::one(), value }).value)
			}
		}
	}

	/// Releases `key` once, keeping the entry around even at zero.
	///
	/// # Errors
	///
	/// Iff the count is already zero.
	pub fn weak_decrement<Q>(&mut self, key: &Q) -> Result<Option<&mut V>, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash + ?Sized,
	{
		let Some(entry) = self.entries.get_mut(key) else {
			return Ok(None);
		};
		entry.count = entry.count.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
		Ok(Some(&mut entry.value))
	}

	pub fn count<Q>(&self, key: &Q) -> Option<&C>
	where
		K: Borrow<Q>,
		Q: Eq + Hash + ?Sized,
	{
		self.entries.get(key).map(|entry| &entry.count)
	}

	/// Removes and yields all entries whose count is zero.
	pub fn drain_weak(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
		self.entries
			.extract_if(|_, entry| entry.count.is_zero())
			.map(|(key, entry)| (key, entry.value))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountSaturatedError;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counts_and_weak_drain() {
		let mut map = RcHashMap::<&str, u8, String>::new();
		map.increment_or_insert_with("click", |k| format!("{}!", k)).unwrap();
		map.increment_or_insert_with("click", |_| unreachable!()).unwrap();
		map.increment_or_insert_with("input", |k| (*k).to_owned()).unwrap();
		assert_eq!(map.count("click"), Some(&2));

		map.weak_decrement("click").unwrap();
		map.weak_decrement("input").unwrap();
		assert_eq!(map.drain_weak().collect::<Vec<_>>(), [("input", "input".to_owned())]);
		assert_eq!(map.len(), 1);

		assert!(map.weak_decrement("missing").unwrap().is_none());
		map.weak_decrement("click").unwrap();
		assert_eq!(map.weak_decrement("click").unwrap_err(), CountSaturatedError);
		assert_eq!(map.drain_weak().count(), 1);
		assert!(map.is_empty());
	}

	#[test]
	fn saturation() {
		let mut map = RcHashMap::<u8, u8, ()>::new();
		for _ in 0..u8::MAX {
			map.increment_or_insert_with(0, |_| ()).unwrap();
		}
		assert_eq!(map.increment_or_insert_with(0, |_| ()).unwrap_err(), CountSaturatedError);
		assert_eq!(map.count(&0), Some(&u8::MAX));
	}
}
