
pub use mica_core;
pub use mica_lang;
