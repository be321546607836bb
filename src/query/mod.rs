//! Async data fetching for list pages.
//!
//! Everything here is polled from the event loop tick rather than awaited:
//! - [`ListCoordinator`] owns a searchable list, its loading state and error
//! - [`MutationApplier`] runs per-item mutations and reconciles them locally
//! - [`Query`] fetches a single value
//!
//! Only the most recently issued request may change what is shown.

mod cancel;
mod coordinator;
mod debounce;
mod filter;
mod mutation;
mod single;

pub use coordinator::{ListCoordinator, ListPhase};
pub use filter::CategoryFilter;
pub use mutation::{LocalPatch, MutationApplier, MutationOutcome};
pub use single::Query;
