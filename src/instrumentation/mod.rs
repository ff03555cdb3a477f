//! Request profiling: subsystem timers and the hook registry

pub mod timing;
pub mod registry;

pub use timing::{Instrumentation, SubsystemTimer, RequestTiming, Subsystem, SubsystemTiming};
pub use registry::{slow_request_hook, HookRegistry, RequestHook};
