//! # Property Graph Model
//!
//! Plain DTOs for values flowing between the graph store, the executor and
//! the record normalizer.
//!
//! Design rule: pure data. No I/O, no state, no async.

pub mod node;
pub mod relationship;
pub mod value;
pub mod property_map;
pub mod record;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use value::{Value, IsoDuration};
pub use property_map::PropertyMap;
pub use record::{Record, FromValue};
