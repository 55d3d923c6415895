//! orbit-placement — cluster selection for apps.
//!
//! Turns an app's placement expression (`IntentStruc`) into a
//! `ClusterList`:
//!
//! - explicit and label `allOf` entries → one mandatory group
//! - each nested `anyOf` inside `allOf` → its own optional group
//! - all top-level `anyOf` entries → one shared optional group
//!
//! Optional groups are reduced to a single cluster later, after placement
//! controllers have had their say.

pub mod error;
pub mod resolver;
pub mod types;

pub use error::{PlacementError, PlacementResult};
pub use resolver::{ClusterCatalog, resolve};
pub use types::{ClusterGroup, ClusterList, ClusterRef};
