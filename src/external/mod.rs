pub mod csv_fields;
pub mod csv_price_source;
pub mod price_source;
pub mod sentiment_source;
