pub mod attachment;
pub mod auth;
pub mod chat;
pub mod events;
pub mod files;
pub mod generation;
pub mod inference;
pub mod message;
pub mod turn;
pub mod upload;
pub mod user;
