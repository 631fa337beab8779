pub mod blob;
pub mod context;
pub mod credentials;
pub mod errors;
pub mod exam;
pub mod gate;
pub mod ids;
pub mod paging;
pub mod validation;

pub use context::{ExamContext, Identity};
pub use errors::AccessError;
pub use exam::ExamId;
