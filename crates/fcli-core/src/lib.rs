pub mod error;
pub mod sanitization;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, CoreResult};
pub use sanitization::{
    create_debug_string, is_sensitive_field, sanitize_header_value, sanitize_json_value,
    sanitize_url,
};
pub use types::{BackendName, ProductKind, ResultIndicator};
