pub mod broker;
pub mod chat;
pub mod object_store;

pub use broker::LapinPublisher;
pub use chat::TeloxideChat;
pub use object_store::S3ObjectStore;
