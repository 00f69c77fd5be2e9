//! Transaction access modes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Access mode of the transaction a statement runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

impl TxMode {
    /// Value of the Neo4j `access-mode` header.
    pub fn access_mode(self) -> &'static str {
        match self {
            TxMode::ReadOnly => "READ",
            TxMode::ReadWrite => "WRITE",
        }
    }

    pub fn allows_writes(self) -> bool {
        self == TxMode::ReadWrite
    }
}

impl fmt::Display for TxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.access_mode())
    }
}
