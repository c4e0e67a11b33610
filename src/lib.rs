pub mod cleanup;
pub mod deploy;
pub mod http;
pub mod install;
pub mod platform;
pub mod runtime;
