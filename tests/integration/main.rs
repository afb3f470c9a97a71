// Each file under tests/integration is a module of this one test crate.

mod broker_test;
mod cli_test;
mod streaming_test;
