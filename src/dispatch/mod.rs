//! Command dispatch and lock-state reconciliation.

pub mod dispatcher;
pub mod executor;
pub mod history;
pub mod reconcile;
pub mod resolver;
pub mod unlock_gate;

pub use dispatcher::{CommandDispatcher, DispatchRequest};
pub use executor::ExecutorService;
pub use history::{CommandHistoryView, SecurityEventView};
pub use resolver::DeviceResolver;
