pub mod test_setup;

pub use test_setup::{TestApp, flow_token_from_link};
