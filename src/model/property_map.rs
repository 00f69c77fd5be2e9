//! PropertyMap — the key-value store on nodes, relationships and query parameters.

use std::collections::HashMap;
use super::Value;

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;
