//! Catalogue of engines the registry knows without a descriptor

use dbport_core::{DbPortError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Engine families that share connection property names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFamily {
    Postgres,
    MySql,
    SqlServer,
    Oracle,
    /// File or in-process engines addressed by path
    Embedded,
    Other,
}

/// Built-in engines with an implicit driver descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinEngine {
    Postgres,
    MySql,
    MariaDb,
    SqlServer,
    Oracle,
    Sqlite,
    H2,
    HsqlDb,
    Derby,
    Firebird,
}

impl BuiltinEngine {
    pub const ALL: [BuiltinEngine; 10] = [
        BuiltinEngine::Postgres,
        BuiltinEngine::MySql,
        BuiltinEngine::MariaDb,
        BuiltinEngine::SqlServer,
        BuiltinEngine::Oracle,
        BuiltinEngine::Sqlite,
        BuiltinEngine::H2,
        BuiltinEngine::HsqlDb,
        BuiltinEngine::Derby,
        BuiltinEngine::Firebird,
    ];

    /// Look up an engine by id; case-insensitive, with common aliases
    pub fn from_id(id: &str) -> Result<Self> {
        match id.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "mariadb" => Ok(Self::MariaDb),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "oracle" => Ok(Self::Oracle),
            "sqlite" => Ok(Self::Sqlite),
            "h2" => Ok(Self::H2),
            "hsqldb" => Ok(Self::HsqlDb),
            "derby" => Ok(Self::Derby),
            "firebird" => Ok(Self::Firebird),
            other => Err(DbPortError::UnsupportedEngine(other.to_string())),
        }
    }

    /// Canonical engine id
    pub fn id(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
            Self::Sqlite => "sqlite",
            Self::H2 => "h2",
            Self::HsqlDb => "hsqldb",
            Self::Derby => "derby",
            Self::Firebird => "firebird",
        }
    }

    /// Name of the driver implementation that serves this engine
    pub fn entry_point(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
            Self::Sqlite => "sqlite",
            Self::H2 => "h2",
            Self::HsqlDb => "hsqldb",
            Self::Derby => "derby",
            Self::Firebird => "firebird",
        }
    }

    pub fn family(&self) -> EngineFamily {
        match self {
            Self::Postgres => EngineFamily::Postgres,
            Self::MySql | Self::MariaDb => EngineFamily::MySql,
            Self::SqlServer => EngineFamily::SqlServer,
            Self::Oracle => EngineFamily::Oracle,
            Self::Sqlite | Self::H2 | Self::HsqlDb | Self::Derby => EngineFamily::Embedded,
            Self::Firebird => EngineFamily::Other,
        }
    }

    /// Default TCP port (None for engines addressed by path)
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySql | Self::MariaDb => Some(3306),
            Self::SqlServer => Some(1433),
            Self::Oracle => Some(1521),
            Self::Firebird => Some(3050),
            Self::Sqlite | Self::H2 | Self::HsqlDb | Self::Derby => None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.family() == EngineFamily::Embedded
    }
}

impl fmt::Display for BuiltinEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BuiltinEngine {
    type Err = DbPortError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_id(s)
    }
}
