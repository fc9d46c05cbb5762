use anyhow::{Context, Result};
use log::info;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

use crate::chart_series::{RatingPoint, SeriesRow, SeriesValue};

/// Everything one export run writes: the chart rows and the supporting sheets.
#[derive(Debug, Clone)]
pub struct TrendExport {
    /// Sheet name for the series rows.
    pub title: String,
    /// Series column headers, in column order. Used even when `rows` is empty.
    pub series: Vec<String>,
    pub rows: Vec<SeriesRow>,
    pub ratings: Option<Vec<RatingPoint>>,
    /// Caption per series, e.g. mention totals.
    pub mentions: Vec<(String, usize)>,
}

/// Excel sheet names are limited to 31 characters and may not contain `[]:*?/\`.
fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Series".to_string()
    } else {
        cleaned
    }
}

/// Writes the export to an `.xlsx` file with a series sheet, a mentions sheet,
/// and a ratings sheet when rating data is present.
pub async fn write_excel_file(file_path: &Path, export: &TrendExport) -> Result<()> {
    info!("Initializing Excel workbook for file: {:?}", file_path);
    let mut workbook = Workbook::new();

    let series_sheet = workbook.add_worksheet();
    write_series_sheet(series_sheet, &sheet_name(&export.title), &export.series, &export.rows)?;

    let mentions_sheet = workbook.add_worksheet();
    write_mentions_sheet(mentions_sheet, &export.mentions)?;

    if let Some(ratings) = &export.ratings {
        let ratings_sheet = workbook.add_worksheet();
        write_ratings_sheet(ratings_sheet, ratings)?;
    }

    info!("Saving Excel workbook...");
    workbook.save(file_path)?;
    info!("Excel file saved successfully to {:?}", file_path);
    Ok(())
}

/// Writes the series rows as a JSON array for the chart renderer.
pub async fn write_json_rows(file_path: &Path, rows: &[SeriesRow]) -> Result<()> {
    let json = serde_json::to_string_pretty(rows).context("Failed to serialize series rows")?;
    tokio::fs::write(file_path, json)
        .await
        .with_context(|| format!("Failed to write {:?}", file_path))?;
    info!("Wrote {} series rows to {:?}", rows.len(), file_path);
    Ok(())
}

/// Gaps stay as empty cells so charts built from the sheet break the line there.
fn write_series_sheet(
    sheet: &mut Worksheet,
    name: &str,
    series: &[String],
    rows: &[SeriesRow],
) -> Result<()> {
    sheet.set_name(name)?;
    let header_format = Format::new().set_bold();
    let score_format = Format::new().set_num_format("0.00");

    sheet.set_column_width(0, 14)?;
    sheet.set_column_width(1, 14)?;
    sheet.write_string_with_format(0, 0, "Period", &header_format)?;
    sheet.write_string_with_format(0, 1, "Label", &header_format)?;
    for (idx, header) in series.iter().enumerate() {
        let col = (idx + 2) as u16;
        sheet.set_column_width(col, 18)?;
        sheet.write_string_with_format(0, col, header, &header_format)?;
    }

    for (row_num, row) in rows.iter().enumerate() {
        let current_row = (row_num + 1) as u32;
        sheet.write_string(current_row, 0, &row.axis_key)?;
        sheet.write_string(current_row, 1, &row.axis_label)?;
        for (idx, header) in series.iter().enumerate() {
            let col = (idx + 2) as u16;
            match row.value(header) {
                Some(SeriesValue::Score(score)) => {
                    sheet.write_number_with_format(current_row, col, score, &score_format)?;
                }
                Some(SeriesValue::Count(count)) => {
                    sheet.write_number(current_row, col, f64::from(count))?;
                }
                None => {}
            }
        }
    }
    info!("'{}' sheet written with {} rows.", name, rows.len());
    Ok(())
}

fn write_mentions_sheet(sheet: &mut Worksheet, mentions: &[(String, usize)]) -> Result<()> {
    sheet.set_name("Mentions")?;
    sheet.set_column_width(0, 24)?;
    sheet.set_column_width(1, 12)?;

    sheet.write_string(0, 0, "Series")?;
    sheet.write_string(0, 1, "Mentions")?;
    let mut current_row = 1u32;
    for (series, count) in mentions {
        sheet.write_string(current_row, 0, series)?;
        sheet.write_number(current_row, 1, *count as f64)?;
        current_row += 1;
    }

    current_row += 1;
    sheet.write_string(current_row, 0, "Generated")?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    sheet.write_string(current_row, 1, &timestamp)?;
    Ok(())
}

fn write_ratings_sheet(sheet: &mut Worksheet, ratings: &[RatingPoint]) -> Result<()> {
    sheet.set_name("Ratings")?;
    sheet.set_column_width(0, 14)?;
    sheet.set_column_width(2, 20)?;

    let headers = ["date", "rating", "review_id"];
    for (col_num, header) in headers.iter().enumerate() {
        sheet.write_string(0, col_num as u16, *header)?;
    }
    for (row_num, point) in ratings.iter().enumerate() {
        let current_row = (row_num + 1) as u32;
        sheet.write_string(current_row, 0, point.date.format("%Y-%m-%d").to_string())?;
        sheet.write_number(current_row, 1, point.rating)?;
        sheet.write_string(current_row, 2, point.review_id.as_deref().unwrap_or(""))?;
    }
    info!("'Ratings' sheet written with {} rows.", ratings.len());
    Ok(())
}
