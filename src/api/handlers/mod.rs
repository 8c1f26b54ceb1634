pub mod modules;
pub mod rollback;
pub mod system;

pub use modules::*;
pub use rollback::*;
pub use system::*;
