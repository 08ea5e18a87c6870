//! Value types shared by the safe layer.

mod enums;

pub use enums::{OutputType, Phase};
