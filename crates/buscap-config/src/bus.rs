//! Selection of the message bus the monitor attaches to.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bus the capture session connects to.
///
/// Parsed from `system`, `session`, or any other string, which is taken
/// verbatim as a D-Bus address such as `unix:path=/run/dbus/system_bus_socket`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusAddress {
    /// The well-known system bus.
    #[default]
    System,
    /// The session bus of the invoking user.
    Session,
    /// An explicit bus address.
    Address(String),
}

impl fmt::Display for BusAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => formatter.write_str("system"),
            Self::Session => formatter.write_str("session"),
            Self::Address(address) => formatter.write_str(address),
        }
    }
}

impl FromStr for BusAddress {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        Ok(if trimmed.eq_ignore_ascii_case("system") {
            Self::System
        } else if trimmed.eq_ignore_ascii_case("session") {
            Self::Session
        } else {
            Self::Address(trimmed.to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("system", BusAddress::System)]
    #[case("SESSION", BusAddress::Session)]
    #[case(
        "unix:path=/run/dbus/system_bus_socket",
        BusAddress::Address("unix:path=/run/dbus/system_bus_socket".to_owned())
    )]
    fn parses_bus_selection(#[case] input: &str, #[case] expected: BusAddress) {
        let Ok(parsed) = input.parse::<BusAddress>();
        assert_eq!(parsed, expected);
    }
}
