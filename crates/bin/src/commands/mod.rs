pub mod chat;
pub mod position;
