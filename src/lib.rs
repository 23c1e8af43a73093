//! A library that classifies the local crystalline environment of a point
//! from its nearest neighbours, by polyhedral template matching.
//!
//! The method follows "Robust structural identification via polyhedral
//! template matching" by P. M. Larsen, S. Schmidt and J. Schiøtz (2016):
//! the convex hull of the neighbour cloud is reduced to a canonical graph
//! invariant, looked up against precomputed reference graphs for each
//! candidate lattice, and every surviving correspondence is scored with a
//! closed-form rigid alignment. The match with the lowest deviation wins.
//!
//! # Pipeline
//!
//! - [`convex_hull`]: incremental hull of the neighbour shell
//! - [`canonical`]: canonical labelling, hashing and automorphisms of the
//!   hull facet graph
//! - [`reference`]: ideal templates and their precomputed graph tables
//! - [`quaternion`]: cubic fundamental zone and misorientation helpers
//! - [`matcher`]: the orchestrator gluing the above together
//!
//! Downstream of a match, [`alloy`] classifies chemical ordering and
//! [`deformation`] fits the deformation gradient.
//!
//! # Example
//!
//! ```rust
//! use facette::{LocalHandle, Matcher, StructureType};
//! use nalgebra::Point3;
//!
//! let mut handle = LocalHandle::new();
//! let matcher = Matcher::default();
//!
//! // an ideal body-centred cubic neighbourhood, uniformly dilated
//! let cloud: Vec<Point3<f64>> = facette::reference::TABLES
//!     .bcc
//!     .points
//!     .iter()
//!     .map(|p| Point3::from(p * 2.0))
//!     .collect();
//!
//! let result = matcher.index(&mut handle, &cloud, None);
//! assert_eq!(result.structure, Some(StructureType::Bcc));
//! assert!((result.scale - 2.0).abs() < 1e-7);
//! assert!(result.rmsd < 1e-7);
//! ```
//!
//! The reference tables are built lazily behind a one-shot guard; call
//! [`initialize`] at startup to pay that cost eagerly. After
//! initialisation the tables are read-only and a single [`Matcher`] may be
//! shared across threads, each thread holding its own [`LocalHandle`].

mod alignment;
pub mod alloy;
pub mod canonical;
pub mod convex_hull;
pub mod deformation;
pub mod geometry;
pub mod matcher;
pub mod ordering;
pub mod quaternion;
pub mod reference;

pub use crate::alloy::AlloyType;
pub use crate::convex_hull::HullError;
pub use crate::deformation::Deformation;
pub use crate::matcher::{MatchResult, Matcher, Templates, MAX_INPUT_POINTS};
pub use crate::ordering::{LocalHandle, NeighbourOrdering, OrderingError};
pub use crate::reference::{initialize, StructureType};
