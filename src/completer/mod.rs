mod delayed_operation;
mod manual_future;

pub(crate) use delayed_operation::DelayedOperation;
pub use manual_future::{ManualFuture, ManualFutureCompleter};
