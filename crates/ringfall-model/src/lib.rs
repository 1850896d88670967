//! Shared value types for Ringfall.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - **Identity** ([`PlayerId`], [`WorldId`]): who and where.
//! - **Geometry** ([`Location`], [`BlockPos`], [`Block`], [`VerticalBounds`]):
//!   positions inside a world and what occupies them.
//! - **Items** ([`ItemKind`], [`ItemStack`], [`PotionKind`]): what players
//!   receive during a match.
//! - **Player state** ([`GameMode`], [`Inventory`], [`Health`],
//!   [`StatusEffect`]): the parts of a player a match snapshots and restores.
//! - **Feedback** ([`Notice`], [`Cue`]): what the host shows players.
//!
//! The crate does no I/O. Hosts translate these types to and from their
//! own world representation.

mod error;
mod feedback;
mod geometry;
mod items;
mod player;
mod types;

pub use error::ModelError;
pub use feedback::{Cue, Notice};
pub use geometry::{Block, BlockPos, Location, VerticalBounds};
pub use items::{ItemKind, ItemStack, PotionKind};
pub use player::{EffectKind, EntityKind, GameMode, Health, Inventory, StatusEffect};
pub use types::{PlayerId, WorldId};
