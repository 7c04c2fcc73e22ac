//! Strongly typed node identifiers.
//!
//! Both trees (source AST and IR) name their nodes with dense integer ids so
//! that relations such as "parent of" can live in side tables instead of
//! inside the nodes themselves.

use std::fmt;

macro_rules! define_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
        pub struct $name(u32);

        impl $name {
            /// Construct an identifier from a raw index.
            pub const fn from_raw(raw: usize) -> Self {
                Self(raw as u32)
            }

            /// Retrieve the underlying index.
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a statement or expression of the parsed source
    AstId
);

define_id!(
    /// Identifies a node inside an IR module's arena
    NodeId
);
