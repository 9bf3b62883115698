//! Locale-tolerant coercion of vendor cells into typed values.

mod dates;
mod ids;
mod numeric;

pub use dates::{find_date_in_text, parse_date};
pub use ids::{clean_identifier, clean_text, clean_ticker, cusip_check_digit, is_valid_cusip};
pub use numeric::{parse_number, NumericValue};
