//! Error types for the control-flow-graph execution engine.
//!
//! Every fallible operation in this crate returns [`FlowError`] through the
//! crate-level [`Result`] alias. Errors are grouped by the phase in which
//! they can occur: registration (node types, dependencies), graph
//! construction, and execution.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FlowError>;

/// The complete error taxonomy for registration, graph construction, and
/// execution.
///
/// `FlowError` is `Clone` so that a single failure can be fanned out to every
/// awaiter of a shared dependency resolution (see [`crate::dependency::DependencyCache`]).
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A node type or dependency was registered under a name that already
    /// exists in the registry. Raised at registration time; fatal to
    /// startup.
    #[error("\"{0}\" is already registered")]
    DuplicateRegistration(String),

    /// A node type was registered without declaring an output type.
    #[error("node type \"{0}\" has no declared output type")]
    MissingAnnotation(String),

    /// A `matcher` node type's output type was not declared as a
    /// `(match_key, data)` pair.
    #[error("node type \"{0}\" uses matcher branching but its output type is not a (match_key, data) pair")]
    InvalidMatcherSignature(String),

    /// A dependency was registered whose producer does not itself return a
    /// future. `cflow-core`'s typed registration API (see
    /// [`crate::dependency::register_dependency`]) only accepts async
    /// producers, so this variant is reserved for registration paths that
    /// accept a producer by dynamic/erased type.
    #[error("dependency \"{0}\" must be an async producer")]
    SyncDependencyRejected(String),

    /// A graph referenced a node-type name with no matching registration.
    #[error("no node type registered under \"{0}\"")]
    UnknownNodeType(String),

    /// A graph edge referenced a node name that is not defined in the graph.
    #[error("edge references undefined node \"{0}\"")]
    UnknownSuccessor(String),

    /// `resolve` was asked for a dependency name with no matching
    /// registration.
    #[error("no dependency registered under \"{0}\"")]
    UnknownDependency(String),

    /// A [`crate::tracker::BranchTracker`] was mutated after its completion
    /// signal had already fired. This always indicates a scheduler bug.
    #[error("branch tracker mutated after completion")]
    TrackerClosed,

    /// A dependency's producer recursed into itself, directly or
    /// transitively, within the same resolution chain. Detected rather than
    /// left to overflow the stack (see [`crate::dependency::DependencyCache`]).
    #[error("cyclic dependency detected at \"{0}\"")]
    CyclicDependency(String),

    /// A user-supplied node callable or dependency producer returned an
    /// error, or panicked.
    #[error("user code failed: {0}")]
    UserCodeFailure(String),

    /// The requested start node does not exist in the graph.
    #[error("graph has no node named \"{0}\"")]
    UnknownStartNode(String),
}
