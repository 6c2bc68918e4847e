//! Origin extraction helpers.
//!
//! The origin database is Oracle, reached by an external extraction
//! job. This module renders the statements and landing keys that job
//! uses, so window semantics live in one place.

use floe_core::window::ProcessingWindow;

use crate::config::{DataVolume, EntityConfig};
use crate::warehouse::quote_ident;

/// Query listing an entity's columns in table order.
pub fn columns_query(namespace: &str, entity: &str) -> String {
    format!(
        "SELECT COLUMN_NAME FROM ALL_TAB_COLUMNS \
         WHERE OWNER = '{}' AND TABLE_NAME = '{}' ORDER BY COLUMN_ID",
        namespace.to_uppercase(),
        entity.to_uppercase()
    )
}

/// Extraction query for one processing window.
///
/// The window is closed on both ends, matching the golden range filter,
/// so a row stamped exactly on a boundary is picked up by exactly the
/// run whose window ends there.
pub fn window_query(entity: &EntityConfig, columns: &[String], window: &ProcessingWindow) -> String {
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "SELECT {columns} FROM {namespace}.{entity} \
         WHERE {filter} > TO_TIMESTAMP('{start}', 'YYYY-MM-DD HH24:MI:SS') \
         AND {filter} <= TO_TIMESTAMP('{end}', 'YYYY-MM-DD HH24:MI:SS')",
        columns = column_list.join(", "),
        namespace = quote_ident(&entity.namespace),
        entity = quote_ident(&entity.entity),
        filter = quote_ident(&entity.filter_column),
        start = window.start_str(),
        end = window.end_str(),
    )
}

/// Landing key for an extracted window in the origin tier.
pub fn staged_key(entity: &EntityConfig, window: &ProcessingWindow) -> String {
    format!("{}{}/data.parquet", entity.lake_prefix(), window.end_str())
}

/// Row fetch size for the extraction cursor, by expected volume.
pub fn fetch_hint(volume: DataVolume) -> u32 {
    match volume {
        DataVolume::Few => 10_000,
        DataVolume::Medium => 50_000,
        DataVolume::Huge => 100_000,
    }
}
