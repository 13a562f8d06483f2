pub mod adapter;
pub mod api;
pub mod assets;
pub mod bot;
pub mod error;
pub mod http;
pub mod normalize;
pub mod paginate;
pub mod transcode;

pub use adapter::{dispatch_payload, DiscordAdapter};
pub use api::GatewayPayload;
pub use bot::DiscordBot;
pub use error::DiscordError;
pub use http::DiscordHttp;
pub use transcode::Destination;
