//! Language descriptors and the registry that owns them for the lifetime of
//! the process. Descriptors are loaded once at startup; picking up changes
//! means restarting, which keeps every component's view of a language
//! consistent with the jobs already in flight.

mod descriptor;
mod registry;

pub use descriptor::{substitute, substitute_args, CompileSpec, LanguageDescriptor};
pub use registry::LanguageRegistry;
