//! cellwork-reconciler - Cell-local task reconciliation.
//!
//! The shared job store records what every task should be doing; this
//! cell's executor reports what its containers are actually doing. The
//! two views drift under partial failure, and this crate converges
//! them:
//!
//! - [`processor`]: invoked once per observed container, decides and
//!   executes the single correct action for the (container, task) pair
//! - [`reaper`]: a periodic sweep that fails tasks whose containers
//!   have vanished from the executor
//! - [`delegate`]: the narrow adapter the processor uses to mutate
//!   containers
//! - [`testing`]: scripted executor doubles for exercising both loops
//!
//! Both components share one invariant: a task owned by another cell
//! is never written, and a container without a live, locally-owned
//! task is garbage.

pub mod delegate;
pub mod processor;
pub mod reaper;
pub mod testing;
