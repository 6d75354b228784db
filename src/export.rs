use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, info};

use crate::database::{self, DbPool, ListingRecord};
use crate::models::Result;

/// Joins multiple addresses inside one CSV field.
pub const ADDRESS_SEPARATOR: &str = "; ";

/// Writes the whole store to a CSV, one row per phone, sorted by phone.
/// Returns the row count.
pub async fn export_csv(pool: &DbPool, path: &Path, include_secondary: bool) -> Result<usize> {
    debug!("📊 export_csv() - Writing to {:?}", path);

    let records = database::export_all(pool).await?;
    write_records(path, &records, include_secondary)?;

    info!("💾 Exported {} rows to {}", records.len(), path.display());
    Ok(records.len())
}

fn write_records(path: &Path, records: &[ListingRecord], include_secondary: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WriterBuilder::new().from_path(path)?;

    if include_secondary {
        writer.write_record(["phone", "identity_name", "secondary_name", "addresses", "units"])?;
    } else {
        writer.write_record(["phone", "identity_name", "addresses", "units"])?;
    }

    for record in records {
        let addresses = record.addresses.join(ADDRESS_SEPARATOR);
        let units = record.units.to_string();
        if include_secondary {
            writer.write_record([
                record.phone.as_str(),
                record.identity_name.as_str(),
                record.secondary_name.as_str(),
                addresses.as_str(),
                units.as_str(),
            ])?;
        } else {
            writer.write_record([
                record.phone.as_str(),
                record.identity_name.as_str(),
                addresses.as_str(),
                units.as_str(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct CombineSummary {
    pub total: usize,
    pub first_only: usize,
    pub second_only: usize,
    pub both: usize,
}

struct CombinedRow {
    identity_name: String,
    addresses: BTreeSet<String>,
    in_first: bool,
    in_second: bool,
}

/// Merges two exported CSVs by phone. The first non-empty identity wins,
/// address sets are unioned, units recomputed, and each output row carries a
/// `source` tag: one of the two labels, or `both`.
pub fn combine_exports(
    first: &Path,
    second: &Path,
    out: &Path,
    first_label: &str,
    second_label: &str,
) -> Result<CombineSummary> {
    let mut merged: BTreeMap<String, CombinedRow> = BTreeMap::new();
    merge_file(first, true, &mut merged)?;
    merge_file(second, false, &mut merged)?;

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WriterBuilder::new().from_path(out)?;
    writer.write_record(["phone", "identity_name", "addresses", "units", "source"])?;

    let mut summary = CombineSummary {
        total: merged.len(),
        ..CombineSummary::default()
    };

    for (phone, row) in &merged {
        let source = match (row.in_first, row.in_second) {
            (true, true) => {
                summary.both += 1;
                "both"
            }
            (true, false) => {
                summary.first_only += 1;
                first_label
            }
            (false, true) => {
                summary.second_only += 1;
                second_label
            }
            // Rows only exist because one of the files contributed them.
            (false, false) => continue,
        };

        let addresses = row
            .addresses
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(ADDRESS_SEPARATOR);
        let units = row.addresses.len().to_string();

        writer.write_record([
            phone.as_str(),
            row.identity_name.as_str(),
            addresses.as_str(),
            units.as_str(),
            source,
        ])?;
    }

    writer.flush()?;
    info!(
        "🔀 Combined {} phones ({} both, {} {} only, {} {} only) into {}",
        summary.total,
        summary.both,
        summary.first_only,
        first_label,
        summary.second_only,
        second_label,
        out.display()
    );
    Ok(summary)
}

fn merge_file(
    path: &Path,
    is_first: bool,
    merged: &mut BTreeMap<String, CombinedRow>,
) -> Result<()> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let headers = reader.headers()?.clone();

    // Header-driven lookup so the secondary-name variant reads the same way.
    let phone_col = column(&headers, "phone")?;
    let identity_col = column(&headers, "identity_name")?;
    let addresses_col = headers.iter().position(|h| h == "addresses");

    for record in reader.records() {
        let record = record?;
        let phone = record.get(phone_col).unwrap_or("").trim().to_string();
        if phone.is_empty() {
            continue;
        }
        let identity = record.get(identity_col).unwrap_or("").trim();
        let addresses = addresses_col.and_then(|idx| record.get(idx)).unwrap_or("");

        let entry = merged.entry(phone).or_insert_with(|| CombinedRow {
            identity_name: String::new(),
            addresses: BTreeSet::new(),
            in_first: false,
            in_second: false,
        });

        if entry.identity_name.is_empty() && !identity.is_empty() {
            entry.identity_name = identity.to_string();
        }
        for address in addresses.split(ADDRESS_SEPARATOR) {
            let address = address.trim();
            if !address.is_empty() {
                entry.addresses.insert(address.to_string());
            }
        }
        if is_first {
            entry.in_first = true;
        } else {
            entry.in_second = true;
        }
    }

    Ok(())
}

fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header == name)
        .ok_or_else(|| format!("missing column '{}' in export header", name).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_db_pool;

    #[tokio::test]
    async fn test_export_writes_sorted_rows_with_units() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkpoint.db");
        let pool = create_db_pool(db_path.to_str().unwrap()).await.unwrap();

        database::upsert_phone(&pool, "7705550000", "Second Mgmt", "")
            .await
            .unwrap();
        database::upsert_phone(&pool, "4045551234", "ABC Mgmt", "")
            .await
            .unwrap();
        database::add_address(&pool, "4045551234", "456 Oak Ave")
            .await
            .unwrap();
        database::add_address(&pool, "4045551234", "123 Main St")
            .await
            .unwrap();

        let out = dir.path().join("export.csv");
        let rows = export_csv(&pool, &out, false).await.unwrap();
        assert_eq!(rows, 2);

        let mut reader = ReaderBuilder::new().from_path(&out).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            &StringRecord::from(vec!["phone", "identity_name", "addresses", "units"])
        );
        let records: Vec<StringRecord> =
            reader.records().map(|record| record.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "4045551234");
        assert_eq!(&records[0][1], "ABC Mgmt");
        assert_eq!(&records[0][2], "123 Main St; 456 Oak Ave");
        assert_eq!(&records[0][3], "2");
        assert_eq!(&records[1][0], "7705550000");
        assert_eq!(&records[1][3], "0");
    }

    #[tokio::test]
    async fn test_export_inserts_secondary_column_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkpoint.db");
        let pool = create_db_pool(db_path.to_str().unwrap()).await.unwrap();

        database::upsert_phone(&pool, "4045551234", "Lakeside Villas", "J. Rivers")
            .await
            .unwrap();

        let out = dir.path().join("export.csv");
        export_csv(&pool, &out, true).await.unwrap();

        let mut reader = ReaderBuilder::new().from_path(&out).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            &StringRecord::from(vec![
                "phone",
                "identity_name",
                "secondary_name",
                "addresses",
                "units"
            ])
        );
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[2], "J. Rivers");
    }

    #[test]
    fn test_combine_tags_and_merges_by_phone() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        let out = dir.path().join("combined.csv");

        std::fs::write(
            &first,
            "phone,identity_name,addresses,units\n\
             4045551234,ABC Mgmt,123 Main St,1\n\
             9995551111,,77 Pine Rd,1\n",
        )
        .unwrap();
        std::fs::write(
            &second,
            "phone,identity_name,secondary_name,addresses,units\n\
             4045551234,,Peach Realty,456 Oak Ave,1\n\
             8885552222,Beta Holdings,,9 Birch Way; 77 Pine Rd,2\n",
        )
        .unwrap();

        let summary = combine_exports(&first, &second, &out, "alpha", "beta").unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.both, 1);
        assert_eq!(summary.first_only, 1);
        assert_eq!(summary.second_only, 1);

        let mut reader = ReaderBuilder::new().from_path(&out).unwrap();
        let records: Vec<StringRecord> =
            reader.records().map(|record| record.unwrap()).collect();

        assert_eq!(&records[0][0], "4045551234");
        assert_eq!(&records[0][1], "ABC Mgmt");
        assert_eq!(&records[0][2], "123 Main St; 456 Oak Ave");
        assert_eq!(&records[0][3], "2");
        assert_eq!(&records[0][4], "both");

        assert_eq!(&records[1][0], "8885552222");
        assert_eq!(&records[1][1], "Beta Holdings");
        assert_eq!(&records[1][2], "77 Pine Rd; 9 Birch Way");
        assert_eq!(&records[1][4], "beta");

        assert_eq!(&records[2][0], "9995551111");
        assert_eq!(&records[2][1], "");
        assert_eq!(&records[2][4], "alpha");
    }

    #[test]
    fn test_combine_rejects_missing_phone_column() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        std::fs::write(&first, "number,identity_name,addresses,units\n").unwrap();
        std::fs::write(&second, "phone,identity_name,addresses,units\n").unwrap();

        let result = combine_exports(
            &first,
            &second,
            &dir.path().join("combined.csv"),
            "alpha",
            "beta",
        );
        assert!(result.is_err());
    }
}
