mod handlers;

pub use handlers::{apply_blocking, OperationContext, OperationError};
