pub mod json_feed;
pub mod markup_table;
