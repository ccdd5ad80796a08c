//! Container primitives shared by the callwire runtime crates.

#![warn(missing_docs)]

pub mod heap;

pub use heap::{HeapElement, MinHeap};
