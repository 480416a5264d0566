mod config;
mod debounce;
mod host;
mod services;
mod toolbar;

pub use crate::config::*;
pub use crate::debounce::*;
pub use crate::host::*;
pub use crate::services::*;
pub use crate::toolbar::*;
