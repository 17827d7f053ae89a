
pub mod syntax;
pub mod elaborator;
pub mod error;

pub mod prelude {
    pub use crate::{
        syntax,
        elaborator::*,
        error::*,
    };
}
