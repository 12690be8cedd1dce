//! Cooperative cancellation for blocking waits.
//!
//! The engine never cancels scheduler jobs itself. A cancelled token only
//! releases the completion barrier so the process can exit; jobs that were
//! already submitted keep running and must be removed through the
//! scheduler.

mod token;

pub use token::CancellationToken;
