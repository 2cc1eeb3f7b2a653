//! Deferral of batched attribute notifications to a later turn.

use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use js_sys::{Function, Reflect};
use std::collections::VecDeque;
use tracing::{error, trace};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

pub type Task = Box<dyn FnOnce()>;

/// Runs tasks on a later turn of the (single-threaded) event loop, in scheduling order.
pub trait Scheduler {
	fn schedule(&self, task: Task);
}

/// Queues each task as a browser microtask (`queueMicrotask`).
#[derive(Debug, Default, Clone, Copy)]
pub struct MicrotaskScheduler;
impl Scheduler for MicrotaskScheduler {
	fn schedule(&self, task: Task) {
		let callback: Function = Closure::once_into_js(move || task()).unchecked_into();
		let queue_microtask = match Reflect::get(&js_sys::global(), &JsValue::from_str("queueMicrotask")) {
			Ok(queue_microtask) => queue_microtask,
			Err(error) => return error!("Failed to look up `queueMicrotask`: {:?}", error),
		};
		match queue_microtask.dyn_into::<Function>() {
			Ok(queue_microtask) => {
				if let Err(error) = queue_microtask.call1(&JsValue::UNDEFINED, &callback) {
					error!("Failed to queue microtask: {:?}", error);
				}
			}
			Err(value) => error!("`queueMicrotask` is not a function: {:?}", value),
		}
	}
}

/// Holds tasks until [`flush`](`ManualScheduler::flush`) is called.
///
/// Used where the host drives the event loop itself, and in tests to make "the next tick" explicit.
#[derive(Default)]
pub struct ManualScheduler {
	queue: RefCell<VecDeque<Task>>,
}
impl Debug for ManualScheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManualScheduler").field("pending", &self.pending()).finish()
	}
}
impl ManualScheduler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn pending(&self) -> usize {
		self.queue.borrow().len()
	}

	/// Runs queued tasks until the queue is empty, including tasks scheduled while flushing.
	///
	/// Returns the number of tasks run.
	pub fn flush(&self) -> usize {
		let mut count = 0;
		loop {
			let task = self.queue.borrow_mut().pop_front();
			match task {
				Some(task) => {
					task();
					count += 1;
				}
				None => break,
			}
		}
		trace!("Flushed {} task(s).", count);
		count
	}
}
impl Scheduler for ManualScheduler {
	fn schedule(&self, task: Task) {
		self.queue.borrow_mut().push_back(task);
	}
}
