pub mod feed_stream;
pub mod health;
pub mod market_data;
