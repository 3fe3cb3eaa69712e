//! Data models for the acquisition pipeline

mod source;
mod status;

pub use source::{ASSET_SCHEME, ImageSource, MediaOrigin, RequestIdentity, Target};
pub use status::Status;
