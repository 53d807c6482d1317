use crate::modules::error::NuboResult;

pub mod account;
pub mod cache;
pub mod common;
pub mod database;
pub mod error;
pub mod logger;
pub mod message;
pub mod provider;
pub mod rest;
pub mod scheduler;
pub mod settings;
pub mod sync;
pub mod token;
pub mod utils;

pub trait Initialize {
    async fn initialize() -> NuboResult<()>;
}
