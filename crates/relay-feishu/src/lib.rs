pub mod cipher;
pub mod error;
pub mod event;
pub mod server;
pub mod webhook;

pub use cipher::Cipher;
pub use error::WebhookError;
pub use server::{router, FeishuState};
