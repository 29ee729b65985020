//! Mapping from dbt adapter names to sqlparser dialects.

use sqlparser::dialect::{
    BigQueryDialect, DatabricksDialect, DuckDbDialect, GenericDialect, HiveDialect, MsSqlDialect,
    MySqlDialect, PostgreSqlDialect, RedshiftSqlDialect, SQLiteDialect, SnowflakeDialect,
};

/// SQL dialect used to parse a project's compiled SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    Redshift,
    Snowflake,
    BigQuery,
    Databricks,
    Spark,
    DuckDb,
    MySql,
    TSql,
    Sqlite,
    /// Trino, Presto and anything sqlparser has no dedicated dialect for.
    Generic,
}

impl Dialect {
    /// Pick a dialect from the manifest's `adapter_type`.
    ///
    /// A missing adapter parses as Postgres; unrecognised adapters use the
    /// generic dialect.
    pub fn from_adapter(adapter_type: Option<&str>) -> Self {
        let Some(adapter) = adapter_type else {
            return Dialect::Postgres;
        };
        match adapter.trim().to_ascii_lowercase().as_str() {
            "" | "postgres" | "postgresql" => Dialect::Postgres,
            "redshift" => Dialect::Redshift,
            "snowflake" => Dialect::Snowflake,
            "bigquery" => Dialect::BigQuery,
            "databricks" => Dialect::Databricks,
            "spark" => Dialect::Spark,
            "duckdb" => Dialect::DuckDb,
            "mysql" => Dialect::MySql,
            "sqlserver" | "fabric" | "synapse" => Dialect::TSql,
            "sqlite" => Dialect::Sqlite,
            _ => Dialect::Generic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Redshift => "redshift",
            Dialect::Snowflake => "snowflake",
            Dialect::BigQuery => "bigquery",
            Dialect::Databricks => "databricks",
            Dialect::Spark => "spark",
            Dialect::DuckDb => "duckdb",
            Dialect::MySql => "mysql",
            Dialect::TSql => "tsql",
            Dialect::Sqlite => "sqlite",
            Dialect::Generic => "generic",
        }
    }

    /// The sqlparser dialect to hand to the parser.
    pub fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        match self {
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::Redshift => Box::new(RedshiftSqlDialect {}),
            Dialect::Snowflake => Box::new(SnowflakeDialect {}),
            Dialect::BigQuery => Box::new(BigQueryDialect {}),
            Dialect::Databricks => Box::new(DatabricksDialect {}),
            Dialect::Spark => Box::new(HiveDialect {}),
            Dialect::DuckDb => Box::new(DuckDbDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
            Dialect::TSql => Box::new(MsSqlDialect {}),
            Dialect::Sqlite => Box::new(SQLiteDialect {}),
            Dialect::Generic => Box::new(GenericDialect {}),
        }
    }
}
