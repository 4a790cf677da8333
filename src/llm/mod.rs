pub mod chat;

pub use self::chat::{ ChatClient, CompletionResponse };
