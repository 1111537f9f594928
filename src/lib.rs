// src/lib.rs

pub mod accounts;
pub mod blockchain;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod keyring;
pub mod relay;
pub mod service;
pub mod storage;
pub mod user_op;

pub use crate::core::errors::WalletError;
pub use crate::keyring::KeyringManager;
pub use crate::service::WalletService;
