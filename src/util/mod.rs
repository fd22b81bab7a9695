//! Small helpers shared by the engine and the binary.
//!
//! - **Validation**: base URIs (HTTPS unless local) and feed names
//! - **Text**: making API-provided strings safe and narrow enough to print

mod text;
mod validate;

pub use text::{sanitize_line, truncate_to_width};
pub use validate::{validate_base_uri, validate_feed_name, ValidationError};
