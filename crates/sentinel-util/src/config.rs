//! Common configuration value types. These are plain newtypes with `FromStr`
//! implementations so they slot into clap's value parsing, with environment
//! variables as the primary source.

use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

/// Where to find the broker. Built from `REDIS_HOST` and `REDIS_PORT`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BrokerAddr {
    host: String,
    port: u16,
}

impl BrokerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        BrokerAddr {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection URL in the form the redis client expects.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

impl Display for BrokerAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected HOST:PORT, got {s:?}"))?;
        if host.is_empty() {
            return Err(format!("expected HOST:PORT, got {s:?}"));
        }
        let port = port.parse().map_err(|_| format!("bad port in {s:?}"))?;
        Ok(BrokerAddr::new(host, port))
    }
}

/// Minimum level a log message must have to be output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_slog_level(&self) -> slog::Level {
        match self {
            LogLevel::Debug => slog::Level::Debug,
            LogLevel::Info => slog::Level::Info,
            LogLevel::Warning => slog::Level::Warning,
            LogLevel::Error => slog::Level::Error,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            LogLevel::Debug => f.write_str("debug"),
            LogLevel::Info => f.write_str("info"),
            LogLevel::Warning => f.write_str("warning"),
            LogLevel::Error => f.write_str("error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level {s:?}")),
        }
    }
}

/// How many jobs a worker will run simultaneously. Must be at least 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Concurrency(u16);

impl Concurrency {
    pub fn into_inner(self) -> u16 {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency(1)
    }
}

impl Display for Concurrency {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl TryFrom<u16> for Concurrency {
    type Error = String;

    fn try_from(n: u16) -> Result<Self, Self::Error> {
        if n == 0 {
            Err("concurrency must be at least 1".into())
        } else {
            Ok(Concurrency(n))
        }
    }
}

impl FromStr for Concurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u16 = s.parse().map_err(|_| format!("bad concurrency {s:?}"))?;
        Concurrency::try_from(n)
    }
}
