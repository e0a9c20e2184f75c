//! The Autonetwork orchestrator: grows an IQMESH network from a coordinator
//! by repeated pre-bond/authorize/discover waves. See [`orchestrator::run`]
//! for the entry point.

pub mod authorize;
mod cleanup;
pub mod error;
pub mod input;
pub mod node;
pub mod orchestrator;
pub mod publisher;
pub mod wave;

pub use error::{AuthorizeErr, AutonetworkError, WaveStateCode};
pub use input::{InputParams, OverlappingNetworks};
pub use node::{DpaCapability, NewNode, NodeRecord, NodeTable, PreBondedCandidate};
pub use orchestrator::{run, RunConfig, RunOutcome};
pub use publisher::{Publisher, Transaction, VecPublisher, WaveProgress, WaveResult};
