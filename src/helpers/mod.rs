//! Helper functions for rendering
//!
//! Date formatting, HTML escaping and URL generation shared by the
//! templates, the rich-text renderer and the server.

mod date;
mod html;
mod url;

pub use self::date::*;
pub use self::html::*;
pub use self::url::*;
