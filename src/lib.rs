#![doc(html_root_url = "https://docs.rs/surface-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use serde_json::{Map, Value};

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod attrs;
pub mod component;
pub mod config;
pub mod context;
pub mod dom;
pub mod error;
pub mod events;
mod nested;
pub mod placeholder;
pub mod rc_hash_map;
pub mod registry;
mod render;
pub mod scheduler;
pub mod surface;
pub mod temp_set;

pub use attrs::{AttrBatch, AttrChange, AttrSpec, Write};
pub use component::{Component, Instance, Lifecycle, WeakInstance};
pub use config::{ComponentConfig, ElementRef};
pub use context::Context;
pub use error::{Error, Result};
pub use placeholder::Placeholder;
pub use registry::{ComponentRegistry, ComponentType};
pub use scheduler::{ManualScheduler, MicrotaskScheduler, Scheduler};
pub use surface::{CacheState, Content, SurfaceSpec};
