pub mod runtime;
pub mod fs;
pub mod env_var;
