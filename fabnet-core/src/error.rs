use crate::types::NodeId;
use thiserror::Error;

/// Recoverable error from the Network Store / Path Finder (§4.A, §4.B, §7).
#[derive(Debug, Clone, Error)]
pub enum PathFinderError {
    /// `FindShortest`/`FindAll` called before `NetworkStore::load`.
    #[error("network not loaded")]
    NotLoaded,

    /// The requested start node is not present in the loaded network.
    #[error("unknown start node {0}")]
    UnknownStart(NodeId),

    /// The requested end node is not present in the loaded network.
    #[error("unknown end node {0}")]
    UnknownEnd(NodeId),

    /// Scope filters resolved to zero traversable nodes.
    #[error("scope resolved to an empty traversable set")]
    EmptyScope,
}

/// Recoverable error from the Sampler (§4.E, §7).
#[derive(Debug, Clone, Error)]
pub enum SamplerError {
    /// Every toolset in scope has been exhausted without producing a new pair.
    #[error("no candidate pair could be drawn: all toolsets exhausted")]
    DrawExhausted,

    /// The resolved scope has fewer than two equipments total.
    #[error("scope has too few equipments to sample a pair")]
    InsufficientEquipment,
}
