//! Column-oriented tables for image-based profiles and score outputs.

use crate::error::{Result, ScreenError};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Tokens read as missing values, following the pandas defaults.
const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Text label.
    Categorical(String),
    /// Floating point measurement.
    Continuous(f64),
    /// Integer value (indices, counts, barcodes).
    Ordinal(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value. NaN measurements count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Variable::Missing => true,
            Variable::Continuous(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as ordinal i64.
    pub fn as_ordinal(&self) -> Option<i64> {
        match self {
            Variable::Ordinal(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variable::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            Variable::Ordinal(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String key used for grouping and joining. Missing values share one key.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Whether this value is the text `label`. Missing and non-text values never match.
    pub fn matches_label(&self, label: &str) -> bool {
        match self {
            Variable::Categorical(s) => s == label,
            Variable::Missing => false,
            other => other.key() == label,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Categorical(s) => write!(f, "{}", s),
            Variable::Continuous(v) => write!(f, "{}", format_float(*v)),
            Variable::Ordinal(v) => write!(f, "{}", v),
            Variable::Boolean(true) => write!(f, "True"),
            Variable::Boolean(false) => write!(f, "False"),
            Variable::Missing => Ok(()),
        }
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Variable::Categorical(value.to_string())
    }
}

impl From<String> for Variable {
    fn from(value: String) -> Self {
        Variable::Categorical(value)
    }
}

impl From<f64> for Variable {
    fn from(value: f64) -> Self {
        Variable::Continuous(value)
    }
}

impl From<i64> for Variable {
    fn from(value: i64) -> Self {
        Variable::Ordinal(value)
    }
}

impl From<bool> for Variable {
    fn from(value: bool) -> Self {
        Variable::Boolean(value)
    }
}

/// Format a float so whole numbers keep a trailing `.0`, as pandas writes them.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Infer a column type from raw tokens and convert every value.
///
/// Columns are integer if every present value parses as i64, continuous if
/// every present value parses as f64, boolean if every present value is a
/// True/False literal, otherwise categorical.
fn infer_column(raw: &[String]) -> Vec<Variable> {
    let present: Vec<&str> = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !MISSING_TOKENS.contains(s))
        .collect();

    let all_int = present.iter().all(|s| s.parse::<i64>().is_ok());
    let all_float = all_int || present.iter().all(|s| s.parse::<f64>().is_ok());
    let all_bool = present.iter().all(|s| parse_bool(s).is_some());

    raw.iter()
        .map(|s| {
            let v = s.trim();
            if MISSING_TOKENS.contains(&v) {
                return Variable::Missing;
            }
            if all_int {
                v.parse::<i64>().map(Variable::Ordinal).unwrap_or(Variable::Missing)
            } else if all_float {
                v.parse::<f64>().map(Variable::Continuous).unwrap_or(Variable::Missing)
            } else if all_bool {
                parse_bool(v).map(Variable::Boolean).unwrap_or(Variable::Missing)
            } else {
                Variable::Categorical(v.to_string())
            }
        })
        .collect()
}

/// A table of profiles: ordered, named columns of equal length.
///
/// Rows are wells or cells; columns are metadata (`Metadata_*`) or
/// morphological features. Row order is preserved by every operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileTable {
    column_names: Vec<String>,
    columns: Vec<Vec<Variable>>,
    n_rows: usize,
}

impl ProfileTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns.
    pub fn from_columns(columns: Vec<(String, Vec<Variable>)>) -> Result<Self> {
        let mut table = Self::new();
        for (name, values) in columns {
            table.push_column(&name, values)?;
        }
        Ok(table)
    }

    /// Load a table from a CSV file with a header row.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScreenError::FileNotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let header: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
        if header.is_empty() {
            return Err(ScreenError::EmptyData(format!(
                "CSV file {} has no header",
                path.display()
            )));
        }

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); header.len()];
        for record in reader.records() {
            let record = record?;
            for (col_idx, column) in raw.iter_mut().enumerate() {
                column.push(record.get(col_idx).unwrap_or("").to_string());
            }
        }

        let columns = header
            .into_iter()
            .zip(raw.iter())
            .map(|(name, values)| (name, infer_column(values)))
            .collect();
        Self::from_columns(columns)
    }

    /// Load a table from CSV or Parquet depending on the file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Self::from_csv(path),
            Some("parquet") | Some("pq") => crate::io::parquet::read_parquet(path),
            _ => Err(ScreenError::InvalidInput(format!(
                "unsupported profile format: {}",
                path.display()
            ))),
        }
    }

    /// Write the table to a CSV file without an index column.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.column_names)?;
        for row in 0..self.n_rows {
            let record: Vec<String> = self.columns.iter().map(|c| c[row].to_string()).collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// All values of a column.
    pub fn column(&self, name: &str) -> Result<&[Variable]> {
        self.column_index(name)
            .map(|idx| self.columns[idx].as_slice())
            .ok_or_else(|| ScreenError::MissingColumn(name.to_string()))
    }

    /// Value at a row of a named column.
    pub fn get(&self, row: usize, name: &str) -> Option<&Variable> {
        self.column_index(name)
            .and_then(|idx| self.columns[idx].get(row))
    }

    /// Append a column at the end.
    pub fn push_column(&mut self, name: &str, values: Vec<Variable>) -> Result<()> {
        let idx = self.n_columns();
        self.insert_column(idx, name, values)
    }

    /// Insert a column at `index`.
    pub fn insert_column(&mut self, index: usize, name: &str, values: Vec<Variable>) -> Result<()> {
        if self.has_column(name) {
            return Err(ScreenError::InvalidInput(format!(
                "column '{}' already exists",
                name
            )));
        }
        if self.column_names.is_empty() {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(ScreenError::DimensionMismatch {
                expected: self.n_rows,
                actual: values.len(),
            });
        }
        let index = index.min(self.column_names.len());
        self.column_names.insert(index, name.to_string());
        self.columns.insert(index, values);
        Ok(())
    }

    /// Remove a column and return its values.
    pub fn remove_column(&mut self, name: &str) -> Result<Vec<Variable>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ScreenError::MissingColumn(name.to_string()))?;
        self.column_names.remove(idx);
        Ok(self.columns.remove(idx))
    }

    /// Rename a column in place.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(ScreenError::InvalidInput(format!(
                "column '{}' already exists",
                to
            )));
        }
        let idx = self
            .column_index(from)
            .ok_or_else(|| ScreenError::MissingColumn(from.to_string()))?;
        self.column_names[idx] = to.to_string();
        Ok(())
    }

    /// New table with only the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let mut out = Self::new();
        for name in names {
            out.push_column(name, self.column(name)?.to_vec())?;
        }
        if names.is_empty() {
            out.n_rows = 0;
        }
        Ok(out)
    }

    /// New table with the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            column_names: self.column_names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
            n_rows: rows.len(),
        }
    }

    /// New table with the rows for which `keep` returns true.
    pub fn filter_rows<F: Fn(usize) -> bool>(&self, keep: F) -> Self {
        let rows: Vec<usize> = (0..self.n_rows).filter(|&r| keep(r)).collect();
        self.take_rows(&rows)
    }

    /// Grouping keys of every row over the named columns.
    pub fn row_keys(&self, names: &[String]) -> Result<Vec<Vec<String>>> {
        let cols = names
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..self.n_rows)
            .map(|row| cols.iter().map(|c| c[row].key()).collect())
            .collect())
    }

    /// Stack tables vertically, aligning columns by name.
    ///
    /// The result carries the union of all columns in order of first
    /// appearance; cells absent from a table are missing.
    pub fn concat(tables: &[ProfileTable]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for table in tables {
            for name in &table.column_names {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
        }

        let total_rows: usize = tables.iter().map(|t| t.n_rows).sum();
        let mut columns: Vec<Vec<Variable>> = vec![Vec::with_capacity(total_rows); names.len()];
        for table in tables {
            for (col_idx, name) in names.iter().enumerate() {
                match table.column_index(name) {
                    Some(idx) => columns[col_idx].extend(table.columns[idx].iter().cloned()),
                    None => columns[col_idx]
                        .extend(std::iter::repeat(Variable::Missing).take(table.n_rows)),
                }
            }
        }

        Ok(Self {
            column_names: names,
            columns,
            n_rows: total_rows,
        })
    }

    /// Inner-join annotation rows onto this table.
    ///
    /// Output rows follow this table's order, one per matching annotation
    /// row. Annotation columns come first; this table's columns follow,
    /// skipping any name already present (first occurrence wins).
    pub fn join_annotations(
        &self,
        annotations: &ProfileTable,
        self_key: &str,
        annotation_key: &str,
    ) -> Result<Self> {
        let keys = self.column(self_key)?;
        let annotation_keys = annotations.column(annotation_key)?;

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (row, key) in annotation_keys.iter().enumerate() {
            if key.is_missing() {
                continue;
            }
            index.entry(key.key()).or_default().push(row);
        }

        let mut self_rows = Vec::new();
        let mut annotation_rows = Vec::new();
        for (row, key) in keys.iter().enumerate() {
            if key.is_missing() {
                continue;
            }
            if let Some(matches) = index.get(&key.key()) {
                for &m in matches {
                    self_rows.push(row);
                    annotation_rows.push(m);
                }
            }
        }

        let left = annotations.take_rows(&annotation_rows);
        let right = self.take_rows(&self_rows);
        let mut out = left;
        for (name, values) in right.column_names.into_iter().zip(right.columns) {
            if !out.has_column(&name) {
                out.push_column(&name, values)?;
            }
        }
        out.n_rows = self_rows.len();
        Ok(out)
    }

    /// Dense feature matrix (rows × features) for the named columns.
    ///
    /// Missing cells become NaN. Non-numeric values are an error.
    pub fn feature_matrix(&self, features: &[String]) -> Result<DMatrix<f64>> {
        let cols = features
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>>>()?;

        let mut data = DMatrix::<f64>::zeros(self.n_rows, features.len());
        for (c, values) in cols.iter().enumerate() {
            for (r, value) in values.iter().enumerate() {
                data[(r, c)] = match value {
                    Variable::Missing => f64::NAN,
                    Variable::Continuous(v) => *v,
                    Variable::Ordinal(v) => *v as f64,
                    Variable::Boolean(b) => f64::from(u8::from(*b)),
                    Variable::Categorical(s) => s.trim().parse::<f64>().map_err(|_| {
                        ScreenError::InvalidInput(format!(
                            "feature column '{}' holds non-numeric value '{}'",
                            features[c], s
                        ))
                    })?,
                };
            }
        }
        Ok(data)
    }

    /// Iterate over `(name, values)` pairs.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[Variable])> {
        self.column_names
            .iter()
            .map(|n| n.as_str())
            .zip(self.columns.iter().map(|c| c.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "Metadata_Well,Metadata_treatment,Metadata_dose,Cells_Area").unwrap();
        writeln!(file, "A01,DMSO,0,12.5").unwrap();
        writeln!(file, "A02,cmpd_1,10,13.0").unwrap();
        writeln!(file, "A03,,NA,nan").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv_infers_types() {
        let file = create_test_csv();
        let table = ProfileTable::from_csv(file.path()).unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_columns(), 4);
        assert_eq!(table.get(0, "Metadata_Well"), Some(&Variable::from("A01")));
        assert_eq!(table.get(1, "Metadata_dose"), Some(&Variable::Ordinal(10)));
        assert_eq!(table.get(1, "Cells_Area").and_then(|v| v.as_continuous()), Some(13.0));
        assert!(table.get(2, "Metadata_treatment").unwrap().is_missing());
        assert!(table.get(2, "Metadata_dose").unwrap().is_missing());
        assert!(table.get(2, "Cells_Area").unwrap().is_missing());
    }

    #[test]
    fn test_missing_file() {
        let err = ProfileTable::from_csv("/nonexistent/profile.csv").unwrap_err();
        assert!(matches!(err, ScreenError::FileNotFound(_)));
    }

    #[test]
    fn test_csv_write_keeps_float_format() {
        let table = ProfileTable::from_columns(vec![
            ("name".to_string(), vec!["a".into(), "b".into()]),
            ("score".to_string(), vec![1.0.into(), Variable::Missing]),
        ])
        .unwrap();
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        table.to_csv(file.path()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "name,score\na,1.0\nb,\n");
    }

    #[test]
    fn test_column_length_mismatch() {
        let result = ProfileTable::from_columns(vec![
            ("a".to_string(), vec![1i64.into(), 2i64.into()]),
            ("b".to_string(), vec![1i64.into()]),
        ]);
        assert!(matches!(
            result,
            Err(ScreenError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_concat_aligns_columns() {
        let a = ProfileTable::from_columns(vec![
            ("id".to_string(), vec!["x".into()]),
            ("Cells_A".to_string(), vec![1.0.into()]),
        ])
        .unwrap();
        let b = ProfileTable::from_columns(vec![
            ("Cells_B".to_string(), vec![2.0.into(), 3.0.into()]),
            ("id".to_string(), vec!["y".into(), "z".into()]),
        ])
        .unwrap();

        let merged = ProfileTable::concat(&[a, b]).unwrap();
        assert_eq!(merged.n_rows(), 3);
        assert_eq!(merged.column_names(), &["id", "Cells_A", "Cells_B"]);
        assert!(merged.get(1, "Cells_A").unwrap().is_missing());
        assert!(merged.get(0, "Cells_B").unwrap().is_missing());
        assert_eq!(merged.get(2, "id"), Some(&Variable::from("z")));
    }

    #[test]
    fn test_join_annotations_drops_duplicate_columns() {
        let profile = ProfileTable::from_columns(vec![
            ("Metadata_Well".to_string(), vec!["B02".into(), "A01".into()]),
            ("Metadata_Site".to_string(), vec![1i64.into(), 2i64.into()]),
            ("Cells_Area".to_string(), vec![1.0.into(), 2.0.into()]),
        ])
        .unwrap();
        let platemap = ProfileTable::from_columns(vec![
            ("well_position".to_string(), vec!["A01".into(), "B02".into()]),
            ("Metadata_Site".to_string(), vec![9i64.into(), 9i64.into()]),
            ("treatment".to_string(), vec!["DMSO".into(), "cmpd".into()]),
        ])
        .unwrap();

        let joined = profile
            .join_annotations(&platemap, "Metadata_Well", "well_position")
            .unwrap();

        assert_eq!(joined.n_rows(), 2);
        assert_eq!(
            joined.column_names(),
            &["well_position", "Metadata_Site", "treatment", "Metadata_Well", "Cells_Area"]
        );
        // rows follow the profile order, platemap copy of the duplicate column wins
        assert_eq!(joined.get(0, "treatment"), Some(&Variable::from("cmpd")));
        assert_eq!(joined.get(0, "Metadata_Site"), Some(&Variable::Ordinal(9)));
        assert_eq!(joined.get(1, "Cells_Area"), Some(&Variable::Continuous(2.0)));
    }

    #[test]
    fn test_feature_matrix() {
        let table = ProfileTable::from_columns(vec![
            ("Cells_A".to_string(), vec![1.0.into(), Variable::Missing]),
            ("Cells_B".to_string(), vec![2i64.into(), 4i64.into()]),
            ("label".to_string(), vec!["a".into(), "b".into()]),
        ])
        .unwrap();

        let m = table
            .feature_matrix(&["Cells_A".to_string(), "Cells_B".to_string()])
            .unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 0)], 1.0);
        assert!(m[(1, 0)].is_nan());
        assert_eq!(m[(1, 1)], 4.0);

        assert!(table.feature_matrix(&["label".to_string()]).is_err());
    }

    #[test]
    fn test_insert_and_remove_column() {
        let mut table = ProfileTable::from_columns(vec![(
            "Cells_A".to_string(),
            vec![1.0.into(), 2.0.into()],
        )])
        .unwrap();
        table
            .insert_column(0, "Metadata_idx", vec![0i64.into(), 1i64.into()])
            .unwrap();
        assert_eq!(table.column_names(), &["Metadata_idx", "Cells_A"]);
        assert!(table.insert_column(0, "Cells_A", vec![0i64.into(), 1i64.into()]).is_err());

        let values = table.remove_column("Metadata_idx").unwrap();
        assert_eq!(values, vec![Variable::Ordinal(0), Variable::Ordinal(1)]);
        assert!(matches!(
            table.remove_column("Metadata_idx"),
            Err(ScreenError::MissingColumn(_))
        ));
    }
}
