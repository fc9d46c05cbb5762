pub mod models;
pub mod period;
pub mod topic_sentiment;
pub mod entity_comparison;
pub mod chart_series;
pub mod filters;
pub mod db_connect;
pub mod data_fetch;
pub mod env_loader;
pub mod excel_writer;
