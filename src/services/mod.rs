pub mod auditor;
pub mod placement;
pub mod resolver;
pub mod sorter;

#[cfg(test)]
pub(crate) mod testing;

pub use placement::{PlacementError, PlacementService};
pub use resolver::{choose_better, Choice, DuplicateResolver, ResolveError};
pub use sorter::{SortError, SortSummary, Sorter};
