pub mod client;

pub use client::{AssetLink, GraphCmsClient, GraphCmsError, NewImage};
