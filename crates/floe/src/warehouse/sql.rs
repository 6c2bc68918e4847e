//! SQL generation for the warehouse load step.
//!
//! The load works through a staging table: data is copied from the lake
//! into staging, then merged into the final table with an UPDATE of
//! matching rows followed by an INSERT of new ones. Redshift has no
//! native MERGE usable here, so the two statements are generated and
//! run in that order.

use crate::config::ColumnDef;

/// An upsert from a staging table into a final table.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub schema: String,
    pub table: String,
    pub staging_table: String,
    /// Column names in table order.
    pub columns: Vec<String>,
    /// Primary key columns. Empty degenerates the upsert to a plain
    /// insert of everything in staging.
    pub primary_key: Vec<String>,
}

/// The rendered statements. `update` is `None` when there is no primary
/// key to match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatements {
    pub update: Option<String>,
    pub insert: String,
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

impl UpsertPlan {
    /// Render the UPDATE and INSERT statements.
    pub fn render(&self) -> UpsertStatements {
        let staging_alias = format!("tmp_{}_tmp", self.table);
        let target = qualified(&self.schema, &self.table);
        let staging = qualified(&self.schema, &self.staging_table);

        let update = if self.primary_key.is_empty() {
            None
        } else {
            let assignments: Vec<String> = self
                .columns
                .iter()
                .map(|column| {
                    format!(
                        "{col} = {alias}.{col}",
                        col = quote_ident(column),
                        alias = quote_ident(&staging_alias)
                    )
                })
                .collect();
            let matches: Vec<String> = self
                .primary_key
                .iter()
                .map(|column| {
                    format!(
                        "{alias}.{col} = {table}.{col}",
                        alias = quote_ident(&staging_alias),
                        col = quote_ident(column),
                        table = quote_ident(&self.table)
                    )
                })
                .collect();
            Some(format!(
                "UPDATE {target} SET {assignments} FROM (SELECT * FROM {staging}) AS {alias} WHERE {matches}",
                assignments = assignments.join(", "),
                alias = quote_ident(&staging_alias),
                matches = matches.join(" AND ")
            ))
        };

        let column_list: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let anti_join = if self.primary_key.is_empty() {
            "1 = 1".to_string()
        } else {
            self.primary_key
                .iter()
                .map(|column| {
                    format!(
                        "{alias}.{col} NOT IN (SELECT {col} FROM {target})",
                        alias = quote_ident(&staging_alias),
                        col = quote_ident(column),
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        let insert = format!(
            "INSERT INTO {target} ({columns}) SELECT {columns} FROM {staging} AS {alias} WHERE {anti_join}",
            columns = column_list.join(", "),
            alias = quote_ident(&staging_alias),
        );

        UpsertStatements { update, insert }
    }
}

/// `CREATE TABLE IF NOT EXISTS` from column definitions.
pub fn create_table(
    schema: &str,
    table: &str,
    columns: &[ColumnDef],
    primary_key: &[String],
) -> String {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), column.sql_type))
        .collect();
    if !primary_key.is_empty() {
        let keys: Vec<String> = primary_key.iter().map(|c| quote_ident(c)).collect();
        defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(schema, table),
        defs.join(", ")
    )
}

pub fn drop_table(schema: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", qualified(schema, table))
}

/// Redshift COPY of parquet data from the lake into a table.
pub fn copy_from_storage(
    schema: &str,
    table: &str,
    location: &str,
    iam_role: Option<&str>,
) -> String {
    let credentials = match iam_role {
        Some(role) => format!(" IAM_ROLE '{role}'"),
        None => String::new(),
    };
    format!(
        "COPY {} FROM '{}'{} FORMAT AS PARQUET",
        qualified(schema, table),
        location,
        credentials
    )
}

/// Redshift UNLOAD of a query's result to the lake as parquet.
pub fn unload(
    query: &str,
    location: &str,
    iam_role: Option<&str>,
    partition_by: &[String],
) -> String {
    let credentials = match iam_role {
        Some(role) => format!(" IAM_ROLE '{role}'"),
        None => String::new(),
    };
    let partitioning = if partition_by.is_empty() {
        String::new()
    } else {
        let columns: Vec<String> = partition_by.iter().map(|c| quote_ident(c)).collect();
        format!(" PARTITION BY ({})", columns.join(", "))
    };
    format!(
        "UNLOAD ('{}') TO '{}'{}{} FORMAT AS PARQUET ALLOWOVERWRITE",
        query.replace('\'', "''"),
        location,
        credentials,
        partitioning
    )
}
