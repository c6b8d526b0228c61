//! Account Pool (spec §4.4): owns every [`Account`](crate::credential::Account), the session
//! affinity cache, and the selection algorithm. Exposed to the rest of the crate only through
//! [`actor::AccountPoolHandle`] — nothing outside this module touches [`scheduler::AccountScheduler`]
//! directly.

mod actor;
mod scheduler;

pub use actor::{AccountPool, AccountPoolHandle, spawn};
