//! Ports and port identities.
//!
//! An output port may feed any number of input ports, an input port is fed by at most one
//! output port. Both directions are stored so either end can be walked in O(1), and the
//! [`Graph`](crate::graph::Graph) keeps them symmetric.

use std::{collections::BTreeSet, fmt};

use crate::graph::NodeId;

arena_handle! {
    /// Handle of an input port.
    InputId, "i"
}

arena_handle! {
    /// Handle of an output port.
    OutputId, "o"
}

/// The role of a port on its node.
///
/// - `Env` carries the side-effect environment
/// - `Arg(n)` is the n-th operand or result of an operation
/// - `Stack(n)` is the operand stack slot `n` positions below the top, live across a block
///   boundary
/// - `Local(n)` is local variable slot `n` live across a block boundary
///
/// Ports order by role first (`Env < Arg < Stack < Local`) and then by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortId {
    /// Side-effect environment
    Env,
    /// Operand or result
    Arg(u32),
    /// Stack slot at a block boundary
    Stack(u32),
    /// Local variable at a block boundary
    Local(u32),
}

impl PortId {
    /// Returns `true` for ports that are live across block boundaries.
    #[must_use]
    pub fn is_boundary(self) -> bool {
        matches!(self, PortId::Stack(_) | PortId::Local(_))
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortId::Env => write!(f, "env"),
            PortId::Arg(n) => write!(f, "arg{n}"),
            PortId::Stack(n) => write!(f, "stack{n}"),
            PortId::Local(n) => write!(f, "local{n}"),
        }
    }
}

/// A consuming port.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub(crate) node: NodeId,
    pub(crate) port: PortId,
    pub(crate) source: Option<OutputId>,
}

impl InputPort {
    /// The node owning this port.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The role of this port.
    #[must_use]
    pub fn port(&self) -> PortId {
        self.port
    }

    /// The output feeding this port.
    #[must_use]
    pub fn source(&self) -> Option<OutputId> {
        self.source
    }
}

/// A producing port.
#[derive(Debug, Clone)]
pub struct OutputPort {
    pub(crate) node: NodeId,
    pub(crate) port: PortId,
    pub(crate) targets: BTreeSet<InputId>,
}

impl OutputPort {
    /// The node owning this port.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The role of this port.
    #[must_use]
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Every input fed by this port.
    #[must_use]
    pub fn targets(&self) -> &BTreeSet<InputId> {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_ordering() {
        let mut ports = vec![
            PortId::Local(0),
            PortId::Stack(1),
            PortId::Arg(2),
            PortId::Stack(0),
            PortId::Env,
            PortId::Arg(0),
        ];
        ports.sort();
        assert_eq!(
            ports,
            vec![
                PortId::Env,
                PortId::Arg(0),
                PortId::Arg(2),
                PortId::Stack(0),
                PortId::Stack(1),
                PortId::Local(0),
            ]
        );
    }

    #[test]
    fn test_port_display() {
        assert_eq!(PortId::Env.to_string(), "env");
        assert_eq!(PortId::Stack(3).to_string(), "stack3");
        assert!(PortId::Local(0).is_boundary());
        assert!(!PortId::Arg(0).is_boundary());
    }
}
