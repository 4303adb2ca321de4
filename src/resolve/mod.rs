//! Field resolution.
//!
//! Turns declarative field paths into values. Unqualified paths are nested
//! lookups on the record; `<EntityType>.<field>` paths follow one catalog
//! relationship into an indexed [`EntityCache`].
//!
//! ```text
//! Project {AssetId: "A1"} ──"Asset.Name"──▶ catalog: Project→Asset (AssetId→Id)
//!                                                  │
//!                                                  ▼
//!                          EntityCache[Asset] index Id: "A1" → {Name: "Pump"}
//! ```

mod cache;
mod requirements;
mod resolver;

pub use cache::EntityCache;
pub use requirements::{required_related_entities, required_related_entities_for_sheets};
pub use resolver::FieldResolver;
