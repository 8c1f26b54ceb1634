pub mod module;
pub mod rollback;

pub use module::*;
pub use rollback::*;
