mod client;
pub mod types;

pub use client::JenkinsClient;
pub use types::{BuildAction, BuildDescription, BuildParameter};
