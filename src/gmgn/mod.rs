//! GMGN quotation API: endpoint templates, typed query values and the
//! repository that turns domain lookups into request descriptors.

pub mod repository;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

pub use repository::GmgnRepository;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("must provide a {0}")]
    MissingAddress(&'static str),
    #[error("invalid {kind} '{value}'")]
    InvalidAddress { kind: &'static str, value: String },
    #[error("unknown {kind} '{value}', expected one of: {expected}")]
    UnknownValue {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Quotation API routes, relative to the configured base url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmgnEndpoint {
    TokenInfo { contract_address: String },
    TrendingWallets { timeframe: Timeframe },
    WalletInfo { wallet_address: String },
}

impl GmgnEndpoint {
    pub fn path(&self) -> String {
        match self {
            GmgnEndpoint::TokenInfo { contract_address } => {
                format!("/v1/tokens/sol/{contract_address}")
            }
            GmgnEndpoint::TrendingWallets { timeframe } => {
                format!("/v1/rank/sol/wallets/{timeframe}")
            }
            GmgnEndpoint::WalletInfo { wallet_address } => {
                format!("/v1/smartmoney/sol/walletNew/{wallet_address}")
            }
        }
    }

    /// Appends the route to `base`, keeping any path prefix the base carries.
    pub fn url(&self, base: &Url) -> Result<Url, url::ParseError> {
        let base = base.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{}", self.path()))
    }
}

macro_rules! query_value {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RepositoryError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(RepositoryError::UnknownValue {
                        kind: $kind,
                        value: other.to_string(),
                        expected: concat!($($text, " "),+),
                    }),
                }
            }
        }
    };
}

query_value!(Timeframe, "timeframe", {
    OneDay => "1d",
    SevenDays => "7d",
    ThirtyDays => "30d",
});

query_value!(WalletTag, "wallet tag", {
    All => "all",
    PumpSmart => "pump_smart",
    SmartDegen => "smart_degen",
    Reowned => "reowned",
    SnipeBot => "snipe_bot",
});

query_value!(Period, "period", {
    SevenDays => "7d",
    ThirtyDays => "30d",
});

query_value!(Direction, "direction", {
    Asc => "asc",
    Desc => "desc",
});
