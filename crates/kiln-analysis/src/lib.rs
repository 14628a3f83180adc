//! Effect and alias analysis for kiln IR graphs.
//!
//! Provides the per-operator [`OpEffects`] capability query and the
//! [`MutationOracle`] that optimization passes consult before treating two
//! nodes as interchangeable.

pub mod alias;
pub mod effects;

pub use alias::{AliasDb, MutationOracle};
pub use effects::{EffectSchema, OpEffects, Writes};
