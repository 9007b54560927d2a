//! Destination schema
//!
//! Each dataset is loaded into one table with a fixed column set. The column
//! lists are declared statically here and consulted by the ingestion engine,
//! so mapping a record onto a row never depends on a live database handle.
//! Every table also carries a surrogate `id SERIAL PRIMARY KEY` that is never
//! populated from records.

use std::fmt;
use std::str::FromStr;

/// Columns holding epoch-millisecond values in the export
pub const TIMESTAMP_COLUMNS: [&str; 2] = ["ts", "submit_time"];

/// PostgreSQL type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Timestamp,
    Varchar,
    BigInt,
    Integer,
    Inet,
    Numeric,
    Jsonb,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Inet => "INET",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Jsonb => "JSONB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn col(name: &'static str, column_type: ColumnType) -> Column {
    Column { name, column_type }
}

/// Statically declared destination table
#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    /// Insertable columns, in insert order
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table
    pub fn create_table_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    id SERIAL PRIMARY KEY",
            quote_ident(self.name)
        );
        for column in self.columns {
            sql.push_str(&format!(
                ",\n    {} {}",
                quote_ident(column.name),
                column.column_type.sql_type()
            ));
        }
        sql.push_str("\n)");
        sql
    }
}

/// Quote an identifier for PostgreSQL; table names such as `transaction`
/// are reserved words and `appStart` is case sensitive.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Append-only checkpoint table
pub static JOB_ID: TableSchema = TableSchema {
    name: "JobId",
    columns: &[
        col("ts", ColumnType::Timestamp),
        col("jobId", ColumnType::Varchar),
        col("jobType", ColumnType::Varchar),
    ],
};

pub static APP_START: TableSchema = TableSchema {
    name: "appStart",
    columns: &[
        col("ts", ColumnType::Timestamp),
        col("submit_time", ColumnType::Timestamp),
        col("userid", ColumnType::Varchar),
        col("remote_ip", ColumnType::Inet),
        col("platform", ColumnType::Varchar),
        col("user_agent", ColumnType::Varchar),
        col("sdk_ver", ColumnType::Varchar),
    ],
};

pub static CUSTOM: TableSchema = TableSchema {
    name: "custom",
    columns: &[
        col("ts", ColumnType::Timestamp),
        col("submit_time", ColumnType::Timestamp),
        col("userid", ColumnType::Varchar),
        col("sessionid", ColumnType::BigInt),
        col("remote_ip", ColumnType::Inet),
        col("platform", ColumnType::Varchar),
        col("user_agent", ColumnType::Varchar),
        col("sdk_ver", ColumnType::Varchar),
        col("name", ColumnType::Varchar),
        col("custom_params", ColumnType::Jsonb),
    ],
};

pub static TRANSACTION: TableSchema = TableSchema {
    name: "transaction",
    columns: &[
        col("ts", ColumnType::Timestamp),
        col("submit_time", ColumnType::Timestamp),
        col("userid", ColumnType::Varchar),
        col("sessionid", ColumnType::BigInt),
        col("remote_ip", ColumnType::Inet),
        col("platform", ColumnType::Varchar),
        col("user_agent", ColumnType::Varchar),
        col("sdk_ver", ColumnType::Varchar),
        col("currency", ColumnType::Varchar),
        col("amount", ColumnType::Numeric),
        col("transactionid", ColumnType::Integer),
        col("productid", ColumnType::Varchar),
        col("receipt", ColumnType::Jsonb),
    ],
};

/// Remote dataset / checkpoint job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DatasetKind {
    #[value(name = "appStart")]
    AppStart,
    #[value(name = "custom")]
    Custom,
    #[value(name = "transaction")]
    Transaction,
}

impl DatasetKind {
    /// Collection order of the checkpointed run
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::AppStart,
        DatasetKind::Custom,
        DatasetKind::Transaction,
    ];

    /// Dataset name on the wire, also used as the checkpoint job type
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::AppStart => "appStart",
            DatasetKind::Custom => "custom",
            DatasetKind::Transaction => "transaction",
        }
    }

    pub fn table(self) -> &'static TableSchema {
        match self {
            DatasetKind::AppStart => &APP_START,
            DatasetKind::Custom => &CUSTOM,
            DatasetKind::Transaction => &TRANSACTION,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown dataset '{}'", s))
    }
}

/// Every table the collector writes to
pub fn all_tables() -> [&'static TableSchema; 4] {
    [&JOB_ID, &APP_START, &CUSTOM, &TRANSACTION]
}
