pub mod archive;
pub mod codec;
pub mod events;
pub mod history;
pub mod models;
pub mod session;
pub mod storage;
