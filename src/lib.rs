pub mod client;
pub mod context;
pub mod error;
pub mod hash;
pub mod local;
pub mod path;
pub mod sync;
