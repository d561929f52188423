//! The Work Dispatcher (§4.5): a lease-based consumer of the two
//! diff-calculation queues. Grounded on the teacher's
//! `Actor::serve_in_background` polling-loop shape
//! (semaphore-bounded concurrency, an mpsc completion channel, one
//! `tokio::spawn` per unit of work), generalized from "pop one proving
//! action" to "pick a queue by coin flip, select-and-lease a grouping row,
//! run the calculator".

pub mod calculator;
pub mod dispatcher;
pub mod wire;

pub use calculator::{CalcError, DiffCalculator, NullCalculator};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use wire::{handle, parse, WorkItem, WorkOutcome};
