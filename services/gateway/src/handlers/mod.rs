pub mod command_mapping;
pub mod downloads_cleanup;
pub mod grace_smite;
pub mod ready;
pub mod reply;
pub mod update;

pub use command_mapping::command_mapping_handler;
pub use downloads_cleanup::downloads_cleanup_handler;
pub use grace_smite::{grace_handler, smite_handler};
pub use ready::{audio_ready_handler, video_ready_handler};
pub use reply::reply_handler;
pub use update::message_update_handler;
