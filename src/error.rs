//! Usage errors.
//!
//! Everything in here is fatal for the call that produced it. Resolution problems that only affect
//! part of a render (unknown component types, unknown handlers, malformed placeholders) are not
//! errors at the API level; they are logged as warnings and the rest of the tree still renders.

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
	#[error("component {id:?} was already rendered or decorated")]
	AlreadyRendered { id: String },

	#[error("component {id:?} is disposed")]
	Disposed { id: String },

	#[error("{name:?} is reserved and can't be used as an attribute name")]
	ReservedAttribute { name: String },

	#[error("{name:?} is reserved and can't be used as a surface id")]
	ReservedSurface { name: String },

	#[error("attribute {name:?} is not declared on component {id:?}")]
	UnknownAttribute { id: String, name: String },

	#[error("no root element could be resolved for component {id:?}")]
	MissingElement { id: String },

	#[error("component type {name:?} is not registered")]
	UnregisteredComponent { name: String },

	#[error("DOM operation failed: {0}")]
	Dom(String),
}

impl Error {
	pub(crate) fn dom(error: wasm_bindgen::JsValue) -> Self {
		Self::Dom(format!("{:?}", error))
	}
}
