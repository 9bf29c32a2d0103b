pub mod saved_search;
