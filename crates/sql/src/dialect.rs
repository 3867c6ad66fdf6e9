use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

/// A relational database flavour the connection layer knows how to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// File-based embedded database; has no network port.
    #[serde(rename = "sqlite3")]
    Sqlite,
    #[serde(rename = "mssql")]
    SqlServer,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "postgres")]
    Postgres,
}

/// Registry entry for a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectInfo {
    pub dialect: Dialect,
    pub name: &'static str,
    /// `0` means the dialect has no network port.
    pub default_port: u16,
}

static REGISTRY: [DialectInfo; 4] = [
    DialectInfo {
        dialect: Dialect::Sqlite,
        name: "sqlite3",
        default_port: 0,
    },
    DialectInfo {
        dialect: Dialect::SqlServer,
        name: "mssql",
        default_port: 1433,
    },
    DialectInfo {
        dialect: Dialect::MySql,
        name: "mysql",
        default_port: 3306,
    },
    DialectInfo {
        dialect: Dialect::Postgres,
        name: "postgres",
        default_port: 5432,
    },
];

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::Sqlite,
        Dialect::SqlServer,
        Dialect::MySql,
        Dialect::Postgres,
    ];

    pub fn info(self) -> &'static DialectInfo {
        // The registry is ordered like the enum.
        &REGISTRY[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn default_port(self) -> u16 {
        self.info().default_port
    }

    /// Whether this dialect is file-based and needs no host, port or user.
    pub fn is_embedded(self) -> bool {
        self.default_port() == 0
    }

    /// Look a dialect up by its registry name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .map(|info| info.dialect)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ConnectionError::UnsupportedDialect(s.to_owned()))
    }
}
