pub mod access;
pub mod filename;
pub mod hash;
pub mod jwt;
pub mod multipart;
pub mod title;
