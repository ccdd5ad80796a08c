//! Binary min-heap whose elements track their own slot.
//!
//! Each element stores the array index it currently occupies. That is what lets
//! [`MinHeap::remove`] and [`MinHeap::fix`] start from the element itself and
//! finish in O(log n), instead of scanning for it first. An element that is not
//! held by any heap reports `None`.

use std::rc::Rc;
use std::sync::Arc;

/// An element that can live inside a [`MinHeap`].
///
/// The heap calls [`HeapElement::set_heap_index`] on every move, so the stored
/// index is always the element's true position, or `None` once removed.
/// Setters take `&self`; implementors keep the slot in a `Cell` or an atomic.
pub trait HeapElement {
	/// Strict ordering used to keep the smallest element at the root.
	fn less(&self, other: &Self) -> bool;

	/// Current slot, or `None` when the element is not in a heap.
	fn heap_index(&self) -> Option<usize>;

	/// Records the element's slot. Only the heap should call this.
	fn set_heap_index(&self, index: Option<usize>);
}

impl<T: HeapElement + ?Sized> HeapElement for Arc<T> {
	fn less(&self, other: &Self) -> bool {
		(**self).less(&**other)
	}

	fn heap_index(&self) -> Option<usize> {
		(**self).heap_index()
	}

	fn set_heap_index(&self, index: Option<usize>) {
		(**self).set_heap_index(index);
	}
}

impl<T: HeapElement + ?Sized> HeapElement for Rc<T> {
	fn less(&self, other: &Self) -> bool {
		(**self).less(&**other)
	}

	fn heap_index(&self) -> Option<usize> {
		(**self).heap_index()
	}

	fn set_heap_index(&self, index: Option<usize>) {
		(**self).set_heap_index(index);
	}
}

/// Min-heap over self-indexing elements.
///
/// Elements are usually shared handles (`Arc<T>` / `Rc<T>`) so callers can keep
/// a reference for later [`remove`](Self::remove) or [`fix`](Self::fix) calls.
#[derive(Debug)]
pub struct MinHeap<T> {
	items: Vec<T>,
}

impl<T> Default for MinHeap<T> {
	fn default() -> Self {
		Self { items: Vec::new() }
	}
}

impl<T: HeapElement> MinHeap<T> {
	/// Creates an empty heap.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty heap with room for `capacity` elements.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			items: Vec::with_capacity(capacity),
		}
	}

	/// Number of elements in the heap.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// Returns `true` if the heap holds no elements.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Smallest element, if any.
	pub fn min(&self) -> Option<&T> {
		self.items.first()
	}

	/// Element at `index` in heap order.
	pub fn get(&self, index: usize) -> Option<&T> {
		self.items.get(index)
	}

	/// Iterates elements in storage order (not sorted).
	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.items.iter()
	}

	/// Inserts `element` and records its slot.
	pub fn insert(&mut self, element: T) {
		let index = self.items.len();
		element.set_heap_index(Some(index));
		self.items.push(element);
		self.sift_up(index);
	}

	/// Removes and returns the smallest element.
	pub fn pop_min(&mut self) -> Option<T> {
		if self.items.is_empty() {
			return None;
		}
		self.remove_at(0)
	}

	/// Removes `element` using its stored slot.
	///
	/// Returns `None` without touching the heap when the element reports no
	/// slot or a slot past the end.
	///
	/// The slot is trusted: `element` must belong to this heap. Passing an
	/// element held by a different heap removes whatever sits at its slot here.
	pub fn remove(&mut self, element: &T) -> Option<T> {
		let index = element.heap_index()?;
		if index >= self.items.len() {
			return None;
		}
		self.remove_at(index)
	}

	/// Restores heap order after `element`'s key changed in place.
	///
	/// Returns `false` if the element reports no slot or a slot past the end.
	/// Like [`remove`](Self::remove), `element` must belong to this heap.
	pub fn fix(&mut self, element: &T) -> bool {
		match element.heap_index() {
			Some(index) if index < self.items.len() => {
				self.repair(index);
				true
			}
			_ => false,
		}
	}

	/// Drops every element, marking each as absent first.
	pub fn clear(&mut self) {
		for element in self.items.drain(..) {
			element.set_heap_index(None);
		}
	}

	fn remove_at(&mut self, index: usize) -> Option<T> {
		let last = self.items.len() - 1;
		if index != last {
			self.swap(index, last);
		}
		let removed = self.items.pop()?;
		removed.set_heap_index(None);
		if index < self.items.len() {
			self.repair(index);
		}
		Some(removed)
	}

	fn repair(&mut self, index: usize) {
		if index > 0 && self.items[index].less(&self.items[(index - 1) / 2]) {
			self.sift_up(index);
		} else {
			self.sift_down(index);
		}
	}

	fn sift_up(&mut self, mut index: usize) {
		while index > 0 {
			let parent = (index - 1) / 2;
			if !self.items[index].less(&self.items[parent]) {
				break;
			}
			self.swap(index, parent);
			index = parent;
		}
	}

	fn sift_down(&mut self, mut index: usize) {
		let len = self.items.len();
		loop {
			let left = 2 * index + 1;
			if left >= len {
				break;
			}
			let right = left + 1;
			let smallest = if right < len && self.items[right].less(&self.items[left]) { right } else { left };
			if !self.items[smallest].less(&self.items[index]) {
				break;
			}
			self.swap(index, smallest);
			index = smallest;
		}
	}

	fn swap(&mut self, a: usize, b: usize) {
		self.items.swap(a, b);
		self.items[a].set_heap_index(Some(a));
		self.items[b].set_heap_index(Some(b));
	}
}

#[cfg(test)]
mod tests;
