mod attachments;
mod chats;
mod common;
mod events;
mod generations;
mod messages;
mod upload;
