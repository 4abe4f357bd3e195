use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Congestion-control flavour installed on the bulk sender's socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TcpVariant {
    #[default]
    TcpNewReno,
    TcpReno,
}

impl TcpVariant {
    pub const ALL: [TcpVariant; 2] = [TcpVariant::TcpNewReno, TcpVariant::TcpReno];

    pub fn name(&self) -> &'static str {
        match self {
            TcpVariant::TcpNewReno => "TcpNewReno",
            TcpVariant::TcpReno => "TcpReno",
        }
    }
}

impl fmt::Display for TcpVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TcpVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TcpVariant::ALL
            .into_iter()
            .find(|variant| variant.name() == s)
            .ok_or_else(|| ConfigError::UnknownVariant(s.to_string()))
    }
}
