//! Offset/limit paging for the products whose list endpoints support it.

use super::request::PreparedRequest;
use fcli_core::ProductKind;
use serde_json::Value as JsonValue;

/// Where a product keeps its paging parameters and totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageScheme {
    /// Query parameter holding the index of the first record on a page
    pub offset_param: &'static str,
    pub limit_param: &'static str,
    /// Response field holding the records of one page
    pub records_field: &'static str,
    /// Response field holding the number of records over all pages
    pub total_field: &'static str,
    pub page_size: u64,
}

impl PageScheme {
    pub const SSC: PageScheme = PageScheme {
        offset_param: "start",
        limit_param: "limit",
        records_field: "data",
        total_field: "count",
        page_size: 200,
    };

    pub const FOD: PageScheme = PageScheme {
        offset_param: "offset",
        limit_param: "limit",
        records_field: "items",
        total_field: "totalCount",
        page_size: 50,
    };

    pub fn for_product(product: ProductKind) -> Option<Self> {
        match product {
            ProductKind::Ssc => Some(Self::SSC),
            ProductKind::Fod => Some(Self::FOD),
            _ => None,
        }
    }

    /// The request for the first page. A `limit` the action sets itself is kept.
    pub fn first_page(&self, request: &PreparedRequest) -> PreparedRequest {
        let mut first = request.clone();
        set_query(&mut first, self.offset_param, 0);
        if query_value(&first, self.limit_param).is_none() {
            set_query(&mut first, self.limit_param, self.page_size);
        }
        first
    }

    /// The request for the page after `response`, or `None` when `response` was the last page.
    pub fn next_page(&self, request: &PreparedRequest, response: &JsonValue) -> Option<PreparedRequest> {
        let loaded = response
            .get(self.records_field)
            .and_then(JsonValue::as_array)
            .map_or(0, |records| records.len() as u64);
        if loaded == 0 {
            return None;
        }
        let offset = query_value(request, self.offset_param).unwrap_or(0);
        let next = offset + loaded;
        match response.get(self.total_field).and_then(JsonValue::as_u64) {
            Some(total) if next >= total => return None,
            Some(_) => {}
            // without a total, a short page is the last one
            None => {
                let limit = query_value(request, self.limit_param).unwrap_or(self.page_size);
                if loaded < limit {
                    return None;
                }
            }
        }
        let mut following = request.clone();
        set_query(&mut following, self.offset_param, next);
        Some(following)
    }
}

fn query_value(request: &PreparedRequest, key: &str) -> Option<u64> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
}

fn set_query(request: &mut PreparedRequest, key: &str, value: u64) {
    match request.query.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => request.query.push((key.to_string(), value.to_string())),
    }
}
