//! Process-boundary error plumbing.
//!
//! Library crates expose plain error enums from their own `error` modules.
//! Only the binary wraps them in a rootcause [`Report`] so that startup
//! failures print with their full context chain.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    fn fails() -> Result<(), Boom> {
        Err(Boom.into())
    }

    #[test]
    fn domain_errors_convert_into_reports() {
        let err = fails().expect_err("should fail");
        assert!(err.to_string().contains("boom"));
    }
}
