mod common;

mod eval_tests;
mod plan_tests;
mod validate_tests;
