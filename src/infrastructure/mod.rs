pub mod event_bus;
pub mod log_sanitizer;
pub mod logging;
pub mod rpc_validator;
