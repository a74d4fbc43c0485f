//! Schema inference and value coercion
//!
//! The target table's schema is detected from the first chunk: each column
//! gets the narrowest type that fits every non-empty value, with named
//! datetime columns forced to timestamps. Later chunks are coerced against
//! that schema, and a value that does not fit is reported with its position.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;

use super::error::IngestError;
use super::reader::Chunk;

/// SQL dialect used when generating statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    DuckDb,
}

/// Column type of the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Boolean,
    Timestamp,
    Text,
}

impl ColumnType {
    /// SQL type name for a dialect
    pub fn sql_type(&self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (ColumnType::BigInt, _) => "BIGINT",
            (ColumnType::Double, Dialect::Postgres) => "DOUBLE PRECISION",
            (ColumnType::Double, Dialect::DuckDb) => "DOUBLE",
            (ColumnType::Boolean, _) => "BOOLEAN",
            (ColumnType::Timestamp, _) => "TIMESTAMP",
            (ColumnType::Text, Dialect::Postgres) => "TEXT",
            (ColumnType::Text, Dialect::DuckDb) => "VARCHAR",
        }
    }

    /// Combine the types seen for one column
    pub fn merge_with(self, other: ColumnType) -> ColumnType {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnType::BigInt, ColumnType::Double) | (ColumnType::Double, ColumnType::BigInt) => {
                ColumnType::Double
            }
            _ => ColumnType::Text,
        }
    }

    /// Detect the type of a single raw value (`None` for an empty cell)
    pub fn detect(value: &str) -> Option<ColumnType> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if value.parse::<i64>().is_ok() {
            Some(ColumnType::BigInt)
        } else if NUMBER_REGEX.is_match(value) && value.parse::<f64>().is_ok() {
            Some(ColumnType::Double)
        } else if parse_bool(value).is_some() {
            Some(ColumnType::Boolean)
        } else if parse_timestamp(value).is_some() {
            Some(ColumnType::Timestamp)
        } else {
            Some(ColumnType::Text)
        }
    }
}

static NUMBER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").unwrap());

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a date/time string into a timestamp.
///
/// Values with a UTC offset are converted to UTC. A bare date maps to
/// midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_utc());
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.naive_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Quote an identifier for SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A typed cell; NULLs keep their column type
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(Option<i64>),
    Float(Option<f64>),
    Boolean(Option<bool>),
    Timestamp(Option<NaiveDateTime>),
    Text(Option<String>),
}

impl Value {
    /// Whether this cell is NULL
    pub fn is_null(&self) -> bool {
        match self {
            Value::Integer(v) => v.is_none(),
            Value::Float(v) => v.is_none(),
            Value::Boolean(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::Text(v) => v.is_none(),
        }
    }

    /// Borrow as a PostgreSQL parameter
    #[cfg(feature = "postgres-backend")]
    pub fn as_pg(&self) -> &(dyn tokio_postgres::types::ToSql + Sync) {
        match self {
            Value::Integer(v) => v,
            Value::Float(v) => v,
            Value::Boolean(v) => v,
            Value::Timestamp(v) => v,
            Value::Text(v) => v,
        }
    }

    /// Convert to a DuckDB parameter; timestamps travel as text and are
    /// cast in the statement
    #[cfg(feature = "duckdb-backend")]
    pub fn to_duckdb(&self) -> duckdb::types::Value {
        use duckdb::types::Value as Db;

        match self {
            Value::Integer(Some(v)) => Db::BigInt(*v),
            Value::Float(Some(v)) => Db::Double(*v),
            Value::Boolean(Some(v)) => Db::Boolean(*v),
            Value::Timestamp(Some(v)) => Db::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Text(Some(v)) => Db::Text(v.clone()),
            _ => Db::Null,
        }
    }
}

/// One row of typed cells, in column order
pub type Row = Vec<Value>;

/// A column of the target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
    /// Whether an empty value was seen while inferring
    pub nullable: bool,
}

/// Typed column list of the target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Infer a schema from the header and the first chunk.
    ///
    /// `sample` is `None` when the source has a header but no rows; every
    /// column is then `Text` except the named datetime columns.
    pub fn infer(
        headers: &StringRecord,
        sample: Option<&Chunk>,
        datetime_columns: &[String],
    ) -> Result<Self, IngestError> {
        let names = column_names(headers);

        for wanted in datetime_columns {
            if !names.iter().any(|n| n == wanted) {
                return Err(IngestError::MissingColumn(wanted.clone()));
            }
        }

        let mut detected: Vec<Option<ColumnType>> = vec![None; names.len()];
        let mut nullable = vec![false; names.len()];

        for row in sample.map(|c| c.rows.as_slice()).unwrap_or_default() {
            for (i, raw) in row.iter().enumerate().take(names.len()) {
                match ColumnType::detect(raw) {
                    None => nullable[i] = true,
                    Some(found) => {
                        detected[i] = Some(match detected[i] {
                            Some(ColumnType::Text) => continue,
                            Some(current) => current.merge_with(found),
                            None => found,
                        });
                    }
                }
            }
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let data_type = if datetime_columns.contains(&name) {
                    ColumnType::Timestamp
                } else {
                    detected[i].unwrap_or(ColumnType::Text)
                };
                ColumnDef {
                    name,
                    data_type,
                    nullable: nullable[i],
                }
            })
            .collect();

        Ok(Self { columns })
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// DROP statement for the target table
    pub fn drop_table_sql(table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(table))
    }

    /// CREATE statement for the target table
    pub fn create_table_sql(&self, table: &str, dialect: Dialect) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", quote_ident(&c.name), c.data_type.sql_type(dialect)))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE {} (\n{}\n)", quote_ident(table), columns)
    }

    /// INSERT statement covering `rows` rows
    pub fn insert_sql(&self, table: &str, dialect: Dialect, rows: usize) -> String {
        let columns = self
            .column_names()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");

        let width = self.columns.len();
        let tuples = (0..rows)
            .map(|r| {
                let placeholders = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(c, col)| match dialect {
                        Dialect::Postgres => format!("${}", r * width + c + 1),
                        Dialect::DuckDb if col.data_type == ColumnType::Timestamp => {
                            "CAST(? AS TIMESTAMP)".to_string()
                        }
                        Dialect::DuckDb => "?".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({placeholders})")
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            columns,
            tuples
        )
    }

    /// Coerce every row of a chunk to this schema
    pub fn coerce_chunk(&self, chunk: &Chunk) -> Result<Vec<Row>, IngestError> {
        chunk
            .rows
            .iter()
            .map(|record| {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                self.columns
                    .iter()
                    .zip(record.iter())
                    .map(|(column, raw)| {
                        coerce_value(raw, column.data_type).ok_or_else(|| IngestError::Coercion {
                            chunk: chunk.index,
                            line,
                            column: column.name.clone(),
                            value: raw.to_string(),
                            expected: column.data_type.sql_type(Dialect::Postgres),
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

/// Header names with blanks and duplicates made unique
fn column_names(headers: &StringRecord) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(headers.len());
    for (i, raw) in headers.iter().enumerate() {
        let base = match raw.trim() {
            "" => format!("Unnamed: {i}"),
            name => name.to_string(),
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while names.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(name);
    }
    names
}

/// Coerce one raw value; `None` when it does not fit the type
///
/// Blank cells are NULL for typed columns; text is NULL only when truly empty.
fn coerce_value(raw: &str, data_type: ColumnType) -> Option<Value> {
    let value = raw.trim();
    let empty = value.is_empty();

    Some(match data_type {
        ColumnType::BigInt if empty => Value::Integer(None),
        ColumnType::BigInt => Value::Integer(Some(parse_integer(value)?)),
        ColumnType::Double if empty => Value::Float(None),
        ColumnType::Double => Value::Float(Some(value.parse::<f64>().ok()?)),
        ColumnType::Boolean if empty => Value::Boolean(None),
        ColumnType::Boolean => Value::Boolean(Some(parse_bool(value)?)),
        ColumnType::Timestamp if empty => Value::Timestamp(None),
        ColumnType::Timestamp => Value::Timestamp(Some(parse_timestamp(value)?)),
        ColumnType::Text if raw.is_empty() => Value::Text(None),
        ColumnType::Text => Value::Text(Some(raw.to_string())),
    })
}

/// Integers, or floats with no fractional part (e.g. `2.0`)
fn parse_integer(value: &str) -> Option<i64> {
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    let f = value.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::reader::ChunkReader;
    use std::io::Cursor;

    fn first_chunk(text: &str) -> (StringRecord, Chunk) {
        let mut reader = ChunkReader::from_reader(
            Box::new(Cursor::new(text.as_bytes().to_vec())),
            1000,
            "test",
        )
        .unwrap();
        let headers = reader.headers().clone();
        (headers, reader.next_chunk().unwrap().unwrap())
    }

    fn datetime_cols() -> Vec<String> {
        vec![
            "tpep_pickup_datetime".to_string(),
            "tpep_dropoff_datetime".to_string(),
        ]
    }

    const TRIPS: &str = "\
VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,store_and_fwd_flag,congestion_surcharge
1,2021-01-01 00:30:10,2021-01-01 00:36:12,1,2.10,N,2.5
2,2021-01-01 00:51:20,2021-01-01 00:52:19,,0.20,N,
1,2021-01-01 00:43:30,2021-01-01 01:11:06,1,14.70,Y,0
";

    #[test]
    fn test_detect_types() {
        assert_eq!(ColumnType::detect("42"), Some(ColumnType::BigInt));
        assert_eq!(ColumnType::detect("-3.5e2"), Some(ColumnType::Double));
        assert_eq!(ColumnType::detect("TRUE"), Some(ColumnType::Boolean));
        assert_eq!(ColumnType::detect("2021-01-01 00:30:10"), Some(ColumnType::Timestamp));
        assert_eq!(ColumnType::detect("N"), Some(ColumnType::Text));
        assert_eq!(ColumnType::detect("NaN"), Some(ColumnType::Text));
        assert_eq!(ColumnType::detect("  "), None);
    }

    #[test]
    fn test_merge_types() {
        assert_eq!(ColumnType::BigInt.merge_with(ColumnType::Double), ColumnType::Double);
        assert_eq!(ColumnType::Double.merge_with(ColumnType::BigInt), ColumnType::Double);
        assert_eq!(ColumnType::BigInt.merge_with(ColumnType::Boolean), ColumnType::Text);
        assert_eq!(ColumnType::Timestamp.merge_with(ColumnType::Timestamp), ColumnType::Timestamp);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 10)
            .unwrap();
        assert_eq!(parse_timestamp("2021-01-01 00:30:10"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T00:30:10"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T02:30:10+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T00:30:10Z"), Some(expected));
        assert_eq!(parse_timestamp("01/01/2021 12:30:10 AM"), Some(expected));
        assert_eq!(
            parse_timestamp("2021-01-01"),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert!(parse_timestamp("2021-01-01 00:30:10.250").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_infer_trip_schema() {
        let (headers, chunk) = first_chunk(TRIPS);
        let schema = TableSchema::infer(&headers, Some(&chunk), &datetime_cols()).unwrap();

        let types: Vec<ColumnType> = schema.columns.iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::BigInt,
                ColumnType::Timestamp,
                ColumnType::Timestamp,
                ColumnType::BigInt,
                ColumnType::Double,
                ColumnType::Text,
                ColumnType::Double,
            ]
        );
        assert!(schema.column("passenger_count").unwrap().nullable);
        assert!(!schema.column("VendorID").unwrap().nullable);
    }

    #[test]
    fn test_named_datetime_columns_are_forced() {
        let (headers, chunk) = first_chunk("id,pickup\n1,not a date\n");
        let schema = TableSchema::infer(&headers, Some(&chunk), &["pickup".to_string()]).unwrap();
        assert_eq!(schema.column("pickup").unwrap().data_type, ColumnType::Timestamp);

        // ...and so the value must then coerce
        assert!(matches!(
            schema.coerce_chunk(&chunk),
            Err(IngestError::Coercion { expected: "TIMESTAMP", .. })
        ));
    }

    #[test]
    fn test_missing_datetime_column() {
        let (headers, chunk) = first_chunk("LocationID,Borough,Zone\n1,EWR,Newark Airport\n");
        let err = TableSchema::infer(&headers, Some(&chunk), &datetime_cols()).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn(c) if c == "tpep_pickup_datetime"));
    }

    #[test]
    fn test_header_only_schema_is_text() {
        let headers = StringRecord::from(vec!["a", "b"]);
        let schema = TableSchema::infer(&headers, None, &["b".to_string()]).unwrap();
        assert_eq!(schema.columns[0].data_type, ColumnType::Text);
        assert_eq!(schema.columns[1].data_type, ColumnType::Timestamp);
    }

    #[test]
    fn test_blank_and_duplicate_headers() {
        let headers = StringRecord::from(vec!["", "a", "a", "a"]);
        let schema = TableSchema::infer(&headers, None, &[]).unwrap();
        let names: Vec<&str> = schema.column_names().collect();
        assert_eq!(names, vec!["Unnamed: 0", "a", "a.1", "a.2"]);
    }

    #[test]
    fn test_coerce_chunk() {
        let (headers, chunk) = first_chunk(TRIPS);
        let schema = TableSchema::infer(&headers, Some(&chunk), &datetime_cols()).unwrap();
        let rows = schema.coerce_chunk(&chunk).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Value::Integer(Some(1)));
        assert_eq!(
            rows[0][1],
            Value::Timestamp(parse_timestamp("2021-01-01 00:30:10"))
        );
        assert_eq!(rows[1][3], Value::Integer(None));
        assert!(rows[1][6].is_null());
        assert_eq!(rows[2][5], Value::Text(Some("Y".to_string())));
    }

    #[test]
    fn test_coerce_rejects_values_outside_the_schema() {
        let (headers, first) = first_chunk("id,amount\n1,2\n");
        let schema = TableSchema::infer(&headers, Some(&first), &[]).unwrap();

        // Integral floats still fit a BIGINT column
        let (_, later) = first_chunk("id,amount\n2,3.0\n");
        let rows = schema.coerce_chunk(&later).unwrap();
        assert_eq!(rows[0][1], Value::Integer(Some(3)));

        let (_, later) = first_chunk("id,amount\n2,3.5\n");
        match schema.coerce_chunk(&later).unwrap_err() {
            IngestError::Coercion {
                line,
                column,
                value,
                expected,
                ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(column, "amount");
                assert_eq!(value, "3.5");
                assert_eq!(expected, "BIGINT");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_first_chunk_fits_its_own_schema() {
        let sources = [
            "id,amount\n1,٣\n2,٤\n",
            "id,amount\n1,１２\n2,3.5\n",
            "id,amount\n1,1.\n2,.5\n3,+2e3\n",
            "id,flag,note\n1,true,x\n2,,  \n3,no,\n",
            TRIPS,
        ];
        for text in sources {
            let (headers, chunk) = first_chunk(text);
            let schema = TableSchema::infer(&headers, Some(&chunk), &[]).unwrap();
            assert!(
                schema.coerce_chunk(&chunk).is_ok(),
                "chunk rejected by its own schema: {text:?}"
            );
        }
    }

    #[test]
    fn test_non_ascii_digits_are_text() {
        assert_eq!(ColumnType::detect("٣"), Some(ColumnType::Text));
        assert_eq!(ColumnType::detect("１２.５"), Some(ColumnType::Text));

        let (headers, chunk) = first_chunk("id,amount\n1,٣\n2,٤\n");
        let schema = TableSchema::infer(&headers, Some(&chunk), &[]).unwrap();
        assert_eq!(schema.column("amount").unwrap().data_type, ColumnType::Text);

        let rows = schema.coerce_chunk(&chunk).unwrap();
        assert_eq!(rows[0][1], Value::Text(Some("٣".to_string())));
    }

    #[test]
    fn test_blank_text_is_kept() {
        let (headers, chunk) = first_chunk("id,note,count\n1,x,1\n2,  ,  \n3,,\n");
        let schema = TableSchema::infer(&headers, Some(&chunk), &[]).unwrap();
        let rows = schema.coerce_chunk(&chunk).unwrap();

        assert_eq!(rows[1][1], Value::Text(Some("  ".to_string())));
        assert_eq!(rows[1][2], Value::Integer(None));
        assert_eq!(rows[2][1], Value::Text(None));
        assert_eq!(rows[2][2], Value::Integer(None));
    }

    #[test]
    fn test_create_table_sql() {
        let (headers, chunk) = first_chunk("id,fare,\"odd \"\"name\"\"\"\n1,2.5,x\n");
        let schema = TableSchema::infer(&headers, Some(&chunk), &[]).unwrap();

        let pg = schema.create_table_sql("yellow_taxi_data", Dialect::Postgres);
        assert!(pg.starts_with("CREATE TABLE \"yellow_taxi_data\" ("));
        assert!(pg.contains("\"id\" BIGINT"));
        assert!(pg.contains("\"fare\" DOUBLE PRECISION"));
        assert!(pg.contains("\"odd \"\"name\"\"\" TEXT"));

        let duck = schema.create_table_sql("yellow_taxi_data", Dialect::DuckDb);
        assert!(duck.contains("\"fare\" DOUBLE,"));
        assert!(duck.contains("VARCHAR"));

        assert_eq!(
            TableSchema::drop_table_sql("yellow_taxi_data"),
            "DROP TABLE IF EXISTS \"yellow_taxi_data\""
        );
    }

    #[test]
    fn test_insert_sql_placeholders() {
        let headers = StringRecord::from(vec!["id", "ts"]);
        let schema = TableSchema::infer(&headers, None, &["ts".to_string()]).unwrap();

        assert_eq!(
            schema.insert_sql("t", Dialect::Postgres, 2),
            "INSERT INTO \"t\" (\"id\", \"ts\") VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(
            schema.insert_sql("t", Dialect::DuckDb, 1),
            "INSERT INTO \"t\" (\"id\", \"ts\") VALUES (?, CAST(? AS TIMESTAMP))"
        );
    }
}
