// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for writing Rock endpoints and OData filters.

use pct_str::{Encoder, PctString};

/// Collapses an endpoint written over several lines into one line.
///
/// Every line is trimmed and the lines are joined without a separator, except that a
/// line ending in `and` or `or` keeps one space so the OData operator stays apart from
/// the next term.
///
/// # Examples
///
/// ```
/// use heighliner_rock::parse_endpoint;
///
/// let endpoint = parse_endpoint("
///     FinancialAccounts?
///       $filter=
///         IsActive eq true and
///         ParentAccountId eq null
/// ");
/// assert_eq!(endpoint, "FinancialAccounts?$filter=IsActive eq true and ParentAccountId eq null");
/// ```
#[must_use]
pub fn parse_endpoint(endpoint: &str) -> String {
    endpoint
        .split('\n')
        .map(|line| {
            let line = line.trim();
            if line.ends_with("and") || line.ends_with("or") {
                format!("{line} ")
            } else {
                line.to_owned()
            }
        })
        .collect()
}

/// Quotes a string as an OData literal, doubling embedded single quotes.
#[must_use]
pub fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Leaves URI syntax alone and escapes what cannot appear in a URI, such as the spaces
/// of an OData filter.
struct EndpointEncoder;

impl Encoder for EndpointEncoder {
    fn encode(&self, c: char) -> bool {
        !(c.is_ascii_alphanumeric() || "-_.!~*'();/?:@&=+$,#%[]".contains(c))
    }
}

/// Percent-encodes the characters of `url` that are not allowed in a URI.
pub(crate) fn encode_uri(url: &str) -> String {
    PctString::encode(url.chars(), EndpointEncoder).into_string()
}
