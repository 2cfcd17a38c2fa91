/// Installs `env_logger` for a unit test. The output is captured by the test
/// harness and the level is taken from `RUST_LOG` as usual.
pub fn test_logger() {
    if cfg!(not(feature = "hcons_miri")) {
        // Tests run in parallel, so another test may have installed it already.
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
