use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;

use super::{HeapElement, MinHeap};

#[derive(Debug)]
struct Ele {
	value: Cell<i64>,
	slot: Cell<Option<usize>>,
}

impl Ele {
	fn new(value: i64) -> Rc<Self> {
		Rc::new(Self {
			value: Cell::new(value),
			slot: Cell::new(None),
		})
	}
}

impl HeapElement for Ele {
	fn less(&self, other: &Self) -> bool {
		self.value.get() < other.value.get()
	}

	fn heap_index(&self) -> Option<usize> {
		self.slot.get()
	}

	fn set_heap_index(&self, index: Option<usize>) {
		self.slot.set(index);
	}
}

fn values(heap: &mut MinHeap<Rc<Ele>>) -> Vec<i64> {
	std::iter::from_fn(|| heap.pop_min().map(|e| e.value.get())).collect()
}

fn assert_invariants(heap: &MinHeap<Rc<Ele>>) {
	for (i, item) in heap.items.iter().enumerate() {
		assert_eq!(item.heap_index(), Some(i), "slot drifted at {i}");
		if i > 0 {
			let parent = &heap.items[(i - 1) / 2];
			assert!(parent.value.get() <= item.value.get(), "heap order broken at {i}");
		}
	}
}

#[test]
fn pop_min_returns_ascending_order() {
	let mut heap = MinHeap::with_capacity(3);
	heap.insert(Ele::new(10));
	heap.insert(Ele::new(20));
	heap.insert(Ele::new(5));

	assert_eq!(heap.len(), 3);
	assert_eq!(heap.min().map(|e| e.value.get()), Some(5));
	assert_eq!(values(&mut heap), vec![5, 10, 20]);
	assert!(heap.pop_min().is_none());
}

#[test]
fn fix_after_key_change() {
	let mut heap = MinHeap::new();
	let a = Ele::new(10);
	let b = Ele::new(20);
	let c = Ele::new(5);
	heap.insert(a.clone());
	heap.insert(b.clone());
	heap.insert(c.clone());

	c.value.set(100);
	assert!(heap.fix(&c));
	assert_invariants(&heap);
	assert_eq!(values(&mut heap), vec![10, 20, 100]);

	// Not in the heap anymore.
	assert!(!heap.fix(&c));
}

#[test]
fn fix_moves_element_up() {
	let mut heap = MinHeap::new();
	let elems: Vec<_> = [3, 7, 9, 12, 15].into_iter().map(Ele::new).collect();
	for e in &elems {
		heap.insert(e.clone());
	}
	elems[4].value.set(1);
	assert!(heap.fix(&elems[4]));
	assert_eq!(heap.min().map(|e| e.value.get()), Some(1));
	assert_invariants(&heap);
}

#[test]
fn remove_resets_slot() {
	let mut heap = MinHeap::new();
	let a = Ele::new(10);
	let b = Ele::new(20);
	let c = Ele::new(100);
	heap.insert(a.clone());
	heap.insert(b.clone());
	heap.insert(c.clone());

	let removed = heap.remove(&c).expect("c is in the heap");
	assert!(Rc::ptr_eq(&removed, &c));
	assert_eq!(c.heap_index(), None);
	assert_eq!(heap.len(), 2);
	assert_eq!(values(&mut heap), vec![10, 20]);
}

#[test]
fn remove_absent_is_noop() {
	let mut heap = MinHeap::new();
	let a = Ele::new(1);
	heap.insert(a.clone());
	let stray = Ele::new(2);
	assert!(heap.remove(&stray).is_none());

	// A stale slot past the end is also ignored.
	stray.set_heap_index(Some(7));
	assert!(heap.remove(&stray).is_none());
	assert_eq!(heap.len(), 1);
	assert_eq!(a.heap_index(), Some(0));
}

#[test]
fn clear_marks_all_absent() {
	let mut heap = MinHeap::new();
	let elems: Vec<_> = [10, 20, 100].into_iter().map(Ele::new).collect();
	for e in &elems {
		heap.insert(e.clone());
	}
	heap.clear();
	assert!(heap.is_empty());
	assert!(elems.iter().all(|e| e.heap_index().is_none()));

	for e in &elems {
		heap.insert(e.clone());
	}
	heap.insert(Ele::new(1));
	assert_eq!(heap.len(), 4);
	assert_eq!(values(&mut heap), vec![1, 10, 20, 100]);
}

#[derive(Debug, Clone)]
enum Op {
	Insert(i64),
	PopMin,
	Remove(usize),
	Fix(usize, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
	prop_oneof![
		(-1000i64..1000).prop_map(Op::Insert),
		Just(Op::PopMin),
		any::<usize>().prop_map(Op::Remove),
		(any::<usize>(), -1000i64..1000).prop_map(|(i, v)| Op::Fix(i, v)),
	]
}

proptest! {
	#[test]
	fn invariants_hold_under_random_ops(ops in prop::collection::vec(op_strategy(), 1..200)) {
		let mut heap = MinHeap::new();
		let mut pool: Vec<Rc<Ele>> = Vec::new();

		for op in ops {
			match op {
				Op::Insert(v) => {
					let e = Ele::new(v);
					pool.push(e.clone());
					heap.insert(e);
				}
				Op::PopMin => {
					let expected = heap.iter().map(|e| e.value.get()).min();
					let popped = heap.pop_min().map(|e| e.value.get());
					prop_assert_eq!(popped, expected);
				}
				Op::Remove(pick) => {
					if !pool.is_empty() {
						let e = &pool[pick % pool.len()];
						let was_present = e.heap_index().is_some();
						prop_assert_eq!(heap.remove(e).is_some(), was_present);
						prop_assert_eq!(e.heap_index(), None);
					}
				}
				Op::Fix(pick, v) => {
					if !pool.is_empty() {
						let e = &pool[pick % pool.len()];
						if e.heap_index().is_some() {
							e.value.set(v);
							prop_assert!(heap.fix(e));
						}
					}
				}
			}

			assert_invariants(&heap);
			let present = pool.iter().filter(|e| e.heap_index().is_some()).count();
			prop_assert_eq!(present, heap.len());
		}
	}

	#[test]
	fn drains_in_non_decreasing_order(input in prop::collection::vec(-1000i64..1000, 0..100)) {
		let mut heap = MinHeap::new();
		for v in &input {
			heap.insert(Ele::new(*v));
		}
		let out = values(&mut heap);
		let mut sorted = input.clone();
		sorted.sort_unstable();
		prop_assert_eq!(out, sorted);
	}
}
