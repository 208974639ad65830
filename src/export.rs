//! Display projection of the current batch and the downloadable CSV
//! artifact.

use crate::csv;
use crate::error::Result;
use crate::models::{Record, SearchContext, SearchMode};
use serde::Serialize;
use std::path::{Path, PathBuf};

const TYPED_COLUMNS: [&str; 5] = ["Name", "Address", "Phone", "Website", "Email"];
const MAP_COLUMNS: [&str; 7] = [
    "Name",
    "Address",
    "Latitude",
    "Longitude",
    "Phone",
    "Website",
    "Email",
];

/// The current batch projected onto the display column set of the
/// search mode. This is what presentation and export consume; the
/// cumulative store is never shown.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct DisplayTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub(crate) fn project(records: &[Record], context: &SearchContext) -> DisplayTable {
    let columns: &[&str] = if context.is_typed() {
        &TYPED_COLUMNS
    } else {
        &MAP_COLUMNS
    };

    let rows = records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|col| match *col {
                    "Name" => r.name.clone().unwrap_or_default(),
                    "Address" => r.address.clone().unwrap_or_default(),
                    "Phone" => r.phone.clone().unwrap_or_default(),
                    "Website" => r.website.clone().unwrap_or_default(),
                    "Email" => r.email.clone().unwrap_or_default(),
                    "Latitude" => r.latitude.map(|v| v.to_string()).unwrap_or_default(),
                    "Longitude" => r.longitude.map(|v| v.to_string()).unwrap_or_default(),
                    _ => String::new(),
                })
                .collect()
        })
        .collect();

    DisplayTable {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

/// Artifact filename: category + place for typed searches, category +
/// coordinates for map searches, spaces replaced by underscores.
pub(crate) fn export_filename(context: &SearchContext) -> String {
    let raw = match &context.mode {
        SearchMode::Typed { place } => format!("{}_{}.csv", context.category, place),
        SearchMode::Map {
            latitude,
            longitude,
            ..
        } => format!("{}_{}_{}.csv", context.category, latitude, longitude),
    };
    raw.replace(' ', "_")
}

/// Writes the projected table as a CSV artifact and returns its path.
pub(crate) fn write_export(
    export_dir: &Path,
    filename: &str,
    table: &DisplayTable,
) -> Result<PathBuf> {
    let path = export_dir.join(filename);
    let text = csv::to_csv_string(&table.columns, &table.rows);
    std::fs::write(&path, text)?;
    tracing::info!("Wrote {} rows to {}", table.rows.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;

    fn record(context: &SearchContext) -> Record {
        Record {
            input_context: context.input_context.clone(),
            name: Some("Cafe A".to_string()),
            address: Some("Main St 1".to_string()),
            phone: Some("010".to_string()),
            website: Some("a.nl".to_string()),
            email: None,
            latitude: Some(52.0),
            longitude: Some(5.0),
            status: RecordStatus::New,
            last_seen: "01-08-2026 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_typed_projection_omits_coordinates() {
        let context = SearchContext::typed("cafe", "Town");
        let table = project(&[record(&context)], &context);
        assert_eq!(
            table.columns,
            vec!["Name", "Address", "Phone", "Website", "Email"]
        );
        assert_eq!(
            table.rows,
            vec![vec![
                "Cafe A".to_string(),
                "Main St 1".to_string(),
                "010".to_string(),
                "a.nl".to_string(),
                String::new(),
            ]]
        );
    }

    #[test]
    fn test_map_projection_includes_coordinates() {
        let context = SearchContext::map("cafe", 52.0, 5.0, 1000);
        let table = project(&[record(&context)], &context);
        assert!(table.columns.contains(&"Latitude".to_string()));
        assert_eq!(table.rows[0][2], "52");
        assert_eq!(table.rows[0][3], "5");
    }

    #[test]
    fn test_filename_derivation() {
        let typed = SearchContext::typed("ice cream", "Den Haag");
        assert_eq!(export_filename(&typed), "ice_cream_Den_Haag.csv");

        let map = SearchContext::map("cafe", 52.5, 5.25, 1000);
        assert_eq!(export_filename(&map), "cafe_52.5_5.25.csv");
    }

    #[test]
    fn test_write_export() {
        let dir = tempfile::tempdir().unwrap();
        let context = SearchContext::typed("cafe", "Town");
        let table = project(&[record(&context)], &context);
        let path = write_export(dir.path(), &export_filename(&context), &table).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("Name,Address,Phone,Website,Email\n"));
        assert!(written.contains("Cafe A"));
    }
}
