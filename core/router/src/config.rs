use serde::{Deserialize, Serialize};

/// A statically trusted peer. Friends are configured at startup and never
/// change at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friend {
    /// The name the peer authenticates as.
    pub name: String,
    /// Host name or address to dial.
    pub addr: String,
    /// Absent for passive friends, which only count when they dial in.
    pub port: Option<u16>,
}
