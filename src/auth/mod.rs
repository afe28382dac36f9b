//! Cookie bridge and credential helpers.
//!
//! The [`CookieBridge`] trait is the only way the pipeline touches cookies; the
//! in-memory [`SharedCookieService`] implements it and can be seeded from a
//! Netscape `cookies.txt` export.

mod bridge;
mod cookies;

pub use bridge::{Cookie, CookieBridge, SharedCookieService, parse_set_cookie};
pub use cookies::{CookieError, ParseResult, load_cookie_file, parse_netscape_cookies};
