pub mod auth;
pub mod chat;
pub mod generation;
pub mod inference;
pub mod message;
pub mod shared;
pub mod upload;
pub mod user;
