use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A single input/output facet a storage provider may support.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
#[non_exhaustive]
pub enum IoFacet {
    /// The storage has an explicit unnamed default graph.
    HasDefaultGraph,
    /// The storage supports named graphs.
    HasNamedGraphs,
    /// Saving the default graph replaces its previous content.
    OverwriteDefault,
    /// Saving a named graph replaces its previous content.
    OverwriteNamed,
    /// Triples can be added to an existing graph without rewriting it.
    CanUpdateAddTriples,
    /// Triples can be removed from an existing graph without rewriting it.
    CanUpdateDeleteTriples,
    /// The storage can hold a graph with no triples in it.
    ExplicitEmptyGraphs,
}

impl IoFacet {
    #[inline]
    const fn to_bit(self) -> u16 {
        match self {
            Self::HasDefaultGraph => 1,
            Self::HasNamedGraphs => 2,
            Self::OverwriteDefault => 4,
            Self::OverwriteNamed => 8,
            Self::CanUpdateAddTriples => 16,
            Self::CanUpdateDeleteTriples => 32,
            Self::ExplicitEmptyGraphs => 64,
        }
    }

    const ALL: [Self; 7] = [
        Self::HasDefaultGraph,
        Self::HasNamedGraphs,
        Self::OverwriteDefault,
        Self::OverwriteNamed,
        Self::CanUpdateAddTriples,
        Self::CanUpdateDeleteTriples,
        Self::ExplicitEmptyGraphs,
    ];
}

/// The set of [`IoFacet`]s a storage provider supports.
///
/// ```
/// use sparupdate::{IoBehaviour, IoFacet};
///
/// let mut behaviour = IoBehaviour::empty();
/// behaviour |= IoFacet::HasDefaultGraph;
/// behaviour |= IoFacet::OverwriteDefault;
/// assert!(behaviour.contains(IoFacet::OverwriteDefault));
/// assert!(!behaviour.contains(IoFacet::HasNamedGraphs));
/// assert!(behaviour.can_overwrite_graph(true));
/// ```
#[derive(Eq, PartialEq, Clone, Copy, Hash, Default)]
pub struct IoBehaviour {
    value: u16,
}

impl IoBehaviour {
    #[inline]
    pub const fn empty() -> Self {
        Self { value: 0 }
    }

    /// A read/write triple store with a default graph and named graphs
    /// that can only replace whole graphs.
    #[inline]
    pub const fn graph_store() -> Self {
        Self {
            value: IoFacet::HasDefaultGraph.to_bit()
                | IoFacet::HasNamedGraphs.to_bit()
                | IoFacet::OverwriteDefault.to_bit()
                | IoFacet::OverwriteNamed.to_bit(),
        }
    }

    /// A read/write triple store that also supports triple level updates and empty graphs.
    #[inline]
    pub const fn updatable_graph_store() -> Self {
        Self {
            value: Self::graph_store().value
                | IoFacet::CanUpdateAddTriples.to_bit()
                | IoFacet::CanUpdateDeleteTriples.to_bit()
                | IoFacet::ExplicitEmptyGraphs.to_bit(),
        }
    }

    #[inline]
    pub const fn contains(self, facet: IoFacet) -> bool {
        self.value & facet.to_bit() != 0
    }

    #[inline]
    #[must_use]
    pub const fn with(self, facet: IoFacet) -> Self {
        Self {
            value: self.value | facet.to_bit(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn without(self, facet: IoFacet) -> Self {
        Self {
            value: self.value & !facet.to_bit(),
        }
    }

    /// Checks the facet required to address the default graph (`true`) or a named graph (`false`).
    #[inline]
    pub const fn has_graph_kind(self, default_graph: bool) -> bool {
        self.contains(if default_graph {
            IoFacet::HasDefaultGraph
        } else {
            IoFacet::HasNamedGraphs
        })
    }

    /// Checks if saving the default graph (`true`) or a named graph (`false`) replaces its content.
    #[inline]
    pub const fn can_overwrite_graph(self, default_graph: bool) -> bool {
        self.contains(if default_graph {
            IoFacet::OverwriteDefault
        } else {
            IoFacet::OverwriteNamed
        })
    }
}

impl From<IoFacet> for IoBehaviour {
    #[inline]
    fn from(facet: IoFacet) -> Self {
        Self {
            value: facet.to_bit(),
        }
    }
}

impl BitOr<IoFacet> for IoBehaviour {
    type Output = Self;

    #[inline]
    fn bitor(self, facet: IoFacet) -> Self {
        self.with(facet)
    }
}

impl BitOr for IoFacet {
    type Output = IoBehaviour;

    #[inline]
    fn bitor(self, rhs: Self) -> IoBehaviour {
        IoBehaviour::from(self).with(rhs)
    }
}

impl BitOrAssign<IoFacet> for IoBehaviour {
    #[inline]
    fn bitor_assign(&mut self, facet: IoFacet) {
        self.value |= facet.to_bit();
    }
}

impl fmt::Debug for IoBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(IoFacet::ALL.into_iter().filter(|facet| self.contains(*facet)))
            .finish()
    }
}
