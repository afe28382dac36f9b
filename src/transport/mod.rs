//! Transport layer: request building, the connection ceiling and bandwidth throttling.
//!
//! # Example
//!
//! ```no_run
//! use blogfetch_core::config::AppSettings;
//! use blogfetch_core::transport::{HttpClient, RequestOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&AppSettings::default(), None)?;
//! let page = client
//!     .get_text("https://example.tumblr.com/api/read/json", &RequestOptions::default())
//!     .await?;
//! println!("{} bytes", page.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod throttle;

pub use client::{HttpClient, RequestOptions, byte_stream, header_content_length, url_encode};
pub use error::TransportError;
pub use throttle::{ByteStream, ThrottleBudget, ThrottledStream, with_read_timeout};
