//! Opaque ID newtypes for all IR entities.
//!
//! Each ID is a thin `u32` wrapper that is `Copy`, `Ord`, `Hash`, and
//! `Serialize`/`Deserialize`. IDs are created by
//! [`Arena::alloc`](crate::arena::Arena::alloc) and used for O(1) lookup;
//! once a slot is removed its ID is never reused.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a component in the design graph.
    ComponentId
);

define_id!(
    /// Opaque, copyable ID for a port (input endpoint) on a component.
    PortId
);

define_id!(
    /// Opaque, copyable ID for a bus (output endpoint) owned by an exit.
    BusId
);

define_id!(
    /// Opaque, copyable ID for a completion exit of a component.
    ExitId
);

define_id!(
    /// Opaque, copyable ID for an activation entry of a component.
    EntryId
);
