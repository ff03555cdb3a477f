//! Background services: tenant attribution and the deferred task pool

pub mod dispatcher;
pub mod tenant;

pub use dispatcher::Dispatcher;
pub use tenant::TenantContext;
