mod cache_tests;
mod config_tests;
mod error_tests;
mod locator_tests;
