pub mod chats;
pub mod events;
pub mod health;
pub mod media;
pub mod messages;
pub mod sessions;
