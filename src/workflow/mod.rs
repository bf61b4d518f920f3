pub mod form_ctx;
pub mod form_flow;

pub use form_ctx::FormCtx;
pub use form_flow::{FileOutcome, FormFlow};
