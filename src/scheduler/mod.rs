//! Long-poll scheduling for taskpoll.
//!
//! Admission control, the pending request registry, back-off timing and
//! the dispatch loop that ties them together.

mod admission;
mod dispatch;
mod registry;
mod timing;

pub use admission::{AdmissionPermit, AdmissionQueue};
pub use dispatch::{Dispatcher, DISPATCH_THREAD_NAME};
pub use registry::{Insertion, PendingRegistry, PendingRequest, PendingView, RequestId, Resolution};
pub use timing::{BackOff, FAILED_CYCLE_BACK_OFF, MAX_BACK_OFF};
