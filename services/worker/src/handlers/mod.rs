pub mod command_mapping;
pub mod download;

pub use command_mapping::command_mapping_handler;
pub use download::{audio_download_handler, video_download_handler};
