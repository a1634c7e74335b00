pub mod attendance;
pub mod overlay;
pub mod report;
pub mod uploader;
pub mod verification;
