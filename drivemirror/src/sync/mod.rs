pub mod collision;
pub mod decision;
pub mod engine;
pub mod extension;
pub mod remote;
pub mod retry;
pub mod sanitize;
pub mod stats;
pub mod transfer;
