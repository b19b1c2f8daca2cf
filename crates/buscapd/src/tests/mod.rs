//! Cross-module behaviour suites and shared fakes.

pub(crate) mod support;
