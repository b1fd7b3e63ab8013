//! CLI command implementations

pub mod run;
pub mod status;
pub mod validate;

pub use run::execute as run;
pub use status::execute as status;
pub use validate::execute as validate;
