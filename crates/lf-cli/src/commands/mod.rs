//! CLI command implementations

pub(crate) mod class;
pub(crate) mod common;
pub(crate) mod model;
pub(crate) mod poll;
pub(crate) mod snapshot;
pub(crate) mod split;
pub(crate) mod train;
