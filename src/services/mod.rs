pub mod access;
pub mod album;
pub mod derivative;
pub mod image;
pub mod password;
pub mod resolver;
pub mod token;

pub use album::AlbumService;
pub use image::ImageService;
pub use password::AlbumPasswordService;
