//! Testing utilities and harness for Tailsight

pub mod fake_feed;
pub mod fake_host;
pub mod test_rule;

pub use fake_feed::{CountingIndicator, FakeFeed};
pub use fake_host::FakeHost;
pub use test_rule::*;

/// Routes `log` output to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
