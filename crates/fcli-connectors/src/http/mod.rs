pub mod bulk;
pub mod client;
pub mod executor;
pub mod paging;
pub mod request;
pub mod url_builder;

pub use bulk::{parse_bulk_response, BulkRequestBuilder};
pub use executor::HttpRequestHelper;
pub use paging::PageScheme;
pub use request::{parse_body, PreparedRequest, RequestFailure, RequestOutcome};
pub use url_builder::UrlBuilder;
