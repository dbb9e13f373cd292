pub mod error;
pub mod helper;
pub mod http;
pub mod product;

pub use error::{ConnectorError, ConnectorResult};
pub use helper::{RequestHelper, RequestHelpers};
pub use http::{
    HttpRequestHelper, PageScheme, PreparedRequest, RequestFailure, RequestOutcome, UrlBuilder,
};
pub use product::{function_prefix, product_functions, ProductUrls};
