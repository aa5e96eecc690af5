//! Route-template matching for the Nimbus emulator.
//!
//! Independently developed service modules each register route
//! templates of the shape `METHOD /literal/{param}/literal2/...`
//! against a [`BindPoint`]. The [`Router`] selects the single template
//! that should handle a request.
//!
//! Matching is deliberately simple: equal segment counts, every
//! literal segment equal byte-for-byte, `{name}` segments capturing
//! any single non-empty segment. A mismatched literal *excludes* a
//! template outright rather than lowering its rank — unrelated
//! services always differ in at least one literal segment (usually the
//! provider namespace), so after filtering either exactly one template
//! remains or none does. No specificity heuristic exists or is needed.

mod params;
mod router;
mod template;

pub use params::Params;
pub use router::{RouteMatch, Router};
pub use template::{BindPoint, Protocol, RouteTemplate, TemplateError};
