mod blocks;
mod core;
mod format;
mod image;
mod markdown;
mod normalize;
mod ops;
mod plugin;
mod state;
mod structured;

pub use crate::blocks::*;
pub use crate::core::*;
pub use crate::format::*;
pub use crate::image::*;
pub use crate::markdown::*;
pub use crate::normalize::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::state::*;
pub use crate::structured::*;
