// src/export.rs
use crate::{
    dataset::cell_string,
    error::{ItpError, ItpResult},
};
use arrow::{
    array::{Array, Float64Array, Int64Array},
    datatypes::DataType,
    record_batch::RecordBatch,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::Workbook;
use tracing::{info, instrument};

/// Characters that cannot appear in a download file name.
static UNSAFE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("static regex"));

pub fn sheet_name(year: u16) -> String {
    format!("ITP {}", year)
}

/// Largest magnitude an `f64` holds exactly; wider integers are written as text.
const MAX_EXACT_INT: i64 = 1 << 53;

/// `itp_<year>_<state>_<entity>.xlsx`, entity cut to `max_entity` characters.
/// Both parts come from the data, so both are sanitized.
pub fn download_filename(year: u16, state: &str, entity: &str, max_entity: usize) -> String {
    let short: String = entity.chars().take(max_entity).collect();
    let state = state.to_lowercase();
    format!(
        "itp_{}_{}_{}.xlsx",
        year,
        UNSAFE_FILENAME.replace_all(&state, "_"),
        UNSAFE_FILENAME.replace_all(&short, "_")
    )
}

/// Serialize a batch as a single-sheet workbook: header row, then one row per record.
#[instrument(level = "info", skip(batch), fields(rows = batch.num_rows(), columns = batch.num_columns()))]
pub fn export(batch: &RecordBatch, sheet: &str) -> ItpResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet)?;

    let schema = batch.schema();
    for (col, field) in schema.fields().iter().enumerate() {
        let col = column_index(col)?;
        worksheet.write_string(0, col, field.name().as_str())?;
    }

    for (c, array) in batch.columns().iter().enumerate() {
        let col = column_index(c)?;
        for row in 0..batch.num_rows() {
            if array.is_null(row) {
                continue;
            }
            let xl_row = row_index(row)?;
            match array.data_type() {
                DataType::Int64 => {
                    if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
                        let v = a.value(row);
                        if v.unsigned_abs() <= MAX_EXACT_INT as u64 {
                            worksheet.write_number(xl_row, col, v as f64)?;
                        } else {
                            worksheet.write_string(xl_row, col, v.to_string())?;
                        }
                    }
                }
                DataType::Float64 => {
                    if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
                        worksheet.write_number(xl_row, col, a.value(row))?;
                    }
                }
                _ => {
                    let text = cell_string(array, row).ok_or_else(|| {
                        ItpError::ExportFailure(format!(
                            "cannot render row {} of column '{}'",
                            row,
                            schema.field(c).name()
                        ))
                    })?;
                    worksheet.write_string(xl_row, col, text)?;
                }
            }
        }
    }

    let bytes = workbook.save_to_buffer()?;
    info!(bytes = bytes.len(), "workbook written");
    Ok(bytes)
}

fn column_index(col: usize) -> ItpResult<u16> {
    u16::try_from(col).map_err(|_| ItpError::ExportFailure(format!("too many columns ({})", col + 1)))
}

/// Data rows start below the header.
fn row_index(row: usize) -> ItpResult<u32> {
    u32::try_from(row + 1).map_err(|_| ItpError::ExportFailure(format!("too many rows ({})", row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{parse_csv, ColumnHint, TypeHints};
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;

    fn sample() -> RecordBatch {
        let hints = TypeHints::default()
            .with("estado", ColumnHint::Categorical)
            .with("entidade", ColumnHint::Text);
        parse_csv(
            2025,
            "estado;entidade;valor;nota;obs\nPR;PREFEITURA X;10;1.5;Sim\nPR;PREFEITURA X;20;;\n",
            &hints,
        )
        .unwrap()
    }

    fn read_back(bytes: Vec<u8>, sheet: &str) -> Vec<Vec<Data>> {
        let mut wb: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(wb.sheet_names(), vec![sheet.to_string()]);
        let range = wb.worksheet_range(sheet).unwrap();
        range.rows().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn workbook_round_trip() {
        let batch = sample();
        let bytes = export(&batch, "ITP 2025").unwrap();
        let rows = read_back(bytes, "ITP 2025");

        assert_eq!(rows.len(), batch.num_rows() + 1);
        let header: Vec<String> = rows[0].iter().map(|c| c.to_string()).collect();
        assert_eq!(header, vec!["estado", "entidade", "valor", "nota", "obs"]);

        assert_eq!(rows[1][0], Data::String("PR".into()));
        assert_eq!(rows[1][1], Data::String("PREFEITURA X".into()));
        assert_eq!(rows[1][2], Data::Float(10.0));
        assert_eq!(rows[1][3], Data::Float(1.5));
        assert_eq!(rows[1][4], Data::String("Sim".into()));
        assert_eq!(rows[2][2], Data::Float(20.0));
        assert_eq!(rows[2][3], Data::Empty);
    }

    #[test]
    fn wide_integers_keep_every_digit() {
        let batch = parse_csv(
            2025,
            "estado;entidade;id\nPR;A;12345678901234567\nPR;B;9007199254740992\n",
            &TypeHints::default(),
        )
        .unwrap();
        assert_eq!(batch.schema().field(2).data_type(), &DataType::Int64);

        let rows = read_back(export(&batch, "ITP 2025").unwrap(), "ITP 2025");
        assert_eq!(rows[1][2], Data::String("12345678901234567".into()));
        assert_eq!(rows[2][2], Data::Float(9007199254740992.0));
    }

    #[test]
    fn empty_table_still_has_header() {
        let batch = sample().slice(0, 0);
        let rows = read_back(export(&batch, "ITP 2024").unwrap(), "ITP 2024");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 5);
    }

    #[test]
    fn invalid_sheet_name_is_export_failure() {
        assert!(matches!(
            export(&sample(), "bad/name"),
            Err(ItpError::ExportFailure(_))
        ));
    }

    #[test]
    fn filenames_are_truncated_and_sanitized() {
        assert_eq!(
            download_filename(2025, "PR", "PREFEITURA X", 30),
            "itp_2025_pr_PREFEITURA X.xlsx"
        );
        assert_eq!(
            download_filename(2024, "PR", "CONSÓRCIO A/B\\C", 30),
            "itp_2024_pr_CONSÓRCIO A_B_C.xlsx"
        );
        let long = "PREFEITURA MUNICIPAL DE SÃO JOSÉ DOS PINHAIS";
        let name = download_filename(2025, "PR", long, 30);
        assert_eq!(name, "itp_2025_pr_PREFEITURA MUNICIPAL DE SÃO JO.xlsx");

        let name = download_filename(2025, "../../etc", "X", 30);
        assert_eq!(name, "itp_2025_.._.._etc_X.xlsx");
        assert!(!name.contains('/'));
    }
}
