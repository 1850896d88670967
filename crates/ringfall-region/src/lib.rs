//! Region-owning task dispatch for Ringfall.
//!
//! The world is divided into square spatial partitions ("regions"). Every
//! mutation of terrain, entities, or a player's physical state at a
//! location must run on the single worker that owns that location's
//! region. This crate provides that worker pool.
//!
//! Each region is served by its own Tokio task fed by a bounded channel,
//! so jobs for one region run one at a time and in submission order,
//! while different regions proceed in parallel.
//!
//! # Key types
//!
//! - [`RegionDispatcher`]: routes a job to the worker owning a location
//! - [`Dispatch`]: the pending result; chain work with [`Dispatch::then`]
//! - [`RegionKey`]: identifies one partition
//! - [`current_region`]: which region (if any) the caller runs in
//!
//! A job is never retried. When a region's queue is full or closed the
//! job is logged and dropped, and its continuation is skipped.

mod dispatcher;
mod error;
mod key;

pub use dispatcher::{Dispatch, RegionConfig, RegionDispatcher, current_region};
pub use error::DispatchError;
pub use key::RegionKey;
