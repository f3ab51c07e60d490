pub mod broker;
pub mod downloader;
pub mod object_store;

pub use broker::LapinPublisher;
pub use downloader::YtDlpDownloader;
pub use object_store::S3ObjectStore;
