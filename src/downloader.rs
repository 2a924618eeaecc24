use crate::view::TableView;
use csv::Writer;
use std::error::Error;

/// Convert the displayed rows to CSV
///
/// Exports what the dashboard currently shows: the column names as the
/// header row, then the filtered and sorted rows. Empty cells become empty
/// fields and numbers keep the text they had in the sheet (`007` stays `007`).
///
/// # Arguments
/// * `view` - The table view to export
///
/// # Returns
/// * `Result<String, Box<dyn Error>>` - CSV content as a string or an error
pub fn to_csv(view: &TableView) -> Result<String, Box<dyn Error>> {
    let mut writer = Writer::from_writer(Vec::new());

    writer.write_record(view.columns.iter().map(|c| c.name.as_str()))?;
    for row in &view.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// File name offered for the download, derived from the dashboard title.
pub fn download_filename(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "sheet.csv".to_string()
    } else {
        format!("{}.csv", stem)
    }
}
