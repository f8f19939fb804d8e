pub mod chat;
pub mod generation;
pub mod message;
pub mod user;
