pub mod album;
pub mod image;
pub mod password;

pub use album::*;
pub use image::*;
pub use password::*;
