//! Concurrency primitives for the callwire RPC runtime.
//!
//! * [`BlockQueue`]: bounded, resizable FIFO with blocking and batch access
//! * [`EventQueue`]: single-consumer closure queue executed in post order
//! * [`TimerManager`]: one-shot and repeating timers with keyed cancellation
//! * [`protect_call`]: panic containment for user callbacks

#![warn(missing_docs)]

pub mod block_queue;
pub mod event_queue;
pub mod panic;
mod spawn;
pub mod timer;

pub use block_queue::{BlockQueue, QueueError};
pub use event_queue::EventQueue;
pub use panic::{PanicError, panic_message, protect, protect_call};
pub use spawn::{global_handle, runtime_handle};
pub use timer::{TimerHandle, TimerManager};
