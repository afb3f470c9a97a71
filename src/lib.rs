pub mod codec;
pub mod config;
pub mod env;
pub mod message;
pub mod processing;
pub mod rabbitmq;
pub mod worker;

pub use worker::{request_frames, run_worker};
