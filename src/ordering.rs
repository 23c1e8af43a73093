//! Neighbour-ordering collaborator seam and per-thread scratch handle.
//!
//! Topological neighbour ordering (e.g. by Voronoi facet area) is supplied
//! by the caller; the matcher only consumes the permutation it produces
//! and falls back to the input order when it fails. The scratch handle
//! owns the collaborator and its working memory: one handle per thread,
//! never shared.

use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderingError {
    /// The handle carries no collaborator; identity ordering applies.
    #[error("no neighbour-ordering collaborator is attached to this handle")]
    Unavailable,
    /// The collaborator gave up on this cloud.
    #[error("neighbour ordering failed: {0}")]
    Failed(String),
}

/// A caller-supplied topological neighbour ordering.
///
/// Given a normalised cloud (central point first), fill `ordering` with a
/// permutation of `0..points.len()` placing the topologically closest
/// neighbours first. Implementations may keep working memory between
/// calls; the handle guarantees single-threaded use.
pub trait NeighbourOrdering: Send {
    fn order(&mut self, points: &[Vector3<f64>], ordering: &mut [i8]) -> Result<(), OrderingError>;
}

/// Per-thread scratch handle for the matcher.
///
/// Acquire one per calling thread and keep it for the thread's lifetime.
pub struct LocalHandle {
    collaborator: Option<Box<dyn NeighbourOrdering>>,
}

impl LocalHandle {
    /// A handle without a neighbour-ordering collaborator. Requests for
    /// topological ordering fall back to the input order.
    pub fn new() -> Self {
        LocalHandle { collaborator: None }
    }

    /// A handle delegating topological ordering to `collaborator`.
    pub fn with_ordering(collaborator: Box<dyn NeighbourOrdering>) -> Self {
        LocalHandle {
            collaborator: Some(collaborator),
        }
    }

    pub(crate) fn order(
        &mut self,
        points: &[Vector3<f64>],
        ordering: &mut [i8],
    ) -> Result<(), OrderingError> {
        match &mut self.collaborator {
            Some(collaborator) => collaborator.order(points, ordering),
            None => Err(OrderingError::Unavailable),
        }
    }
}

impl Default for LocalHandle {
    fn default() -> Self {
        LocalHandle::new()
    }
}
