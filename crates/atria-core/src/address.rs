//! Link-layer node addresses.

use std::fmt;

/// Length of a link-layer address in bytes (EUI-64).
pub const ADDRESS_LEN: usize = 8;

/// An 8-byte link-layer address.
///
/// The all-zero address is the null address: it identifies no node and
/// never yields a schedulable cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeAddress(pub [u8; ADDRESS_LEN]);

impl NodeAddress {
    /// The null address.
    pub const NULL: Self = Self([0; ADDRESS_LEN]);

    /// Create from raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Conventional simulation address `00:00:00:00:00:00:00:id`.
    pub const fn from_node_id(id: u8) -> Self {
        let mut bytes = [0; ADDRESS_LEN];
        bytes[ADDRESS_LEN - 1] = id;
        Self(bytes)
    }

    /// The node id used for link hashing: the last address byte.
    #[inline]
    pub const fn node_id(&self) -> u8 {
        self.0[ADDRESS_LEN - 1]
    }

    /// Whether this is the null address.
    pub fn is_null(&self) -> bool {
        self.0 == [0; ADDRESS_LEN]
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LEN]> for NodeAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
