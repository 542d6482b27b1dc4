//! Domain value objects shared by the admin boundary and the monitor.

pub mod stream_url;

pub use stream_url::StreamUrl;
