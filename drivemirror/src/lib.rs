pub mod config;
pub mod folder_ref;
pub mod logging;
pub mod sync;
