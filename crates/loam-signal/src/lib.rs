//! Loam Signal -- typed publish/subscribe event dispatch.
//!
//! A [`Dispatcher`] keeps, per event type, an ordered list of handlers and a
//! queue of deferred events. Events are delivered either immediately with
//! [`Dispatcher::trigger`] or in batches with [`Dispatcher::enqueue`] and
//! [`Dispatcher::update`].
//!
//! # Quick Start
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use loam_signal::prelude::*;
//!
//! struct Damaged { amount: u32 }
//!
//! #[derive(Default)]
//! struct Tally { total: Cell<u32> }
//!
//! fn on_damaged(tally: &Tally, event: &mut Damaged, _: &Dispatcher) {
//!     tally.total.set(tally.total.get() + event.amount);
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let tally = Rc::new(Tally::default());
//! dispatcher.sink::<Damaged>().connect_with(&tally, on_damaged).unwrap();
//!
//! dispatcher.trigger(Damaged { amount: 3 });
//! dispatcher.enqueue(Damaged { amount: 4 });
//! assert_eq!(tally.total.get(), 3);
//!
//! assert_eq!(dispatcher.update(), 1);
//! assert_eq!(tally.total.get(), 7);
//! ```

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod sink;

pub use dispatcher::Dispatcher;
pub use sink::{BoundHandler, Connection, Handler, Sink};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by handler registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The same handler (and context) is already connected for this event.
    #[error("handler already connected for event '{event}'")]
    AlreadyConnected { event: &'static str },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::dispatcher::Dispatcher;
    pub use crate::sink::{BoundHandler, Connection, Handler, Sink};
    pub use crate::DispatchError;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
