mod common;

mod cancellation_tests;
mod evaluation_tests;
mod validation_tests;
