//! Field-level row model.
//!
//! A [`RowImage`] is the record buffer the persistor fills before handing it
//! to the table (`record[0]`/`record[1]` in classic handler terms). Store
//! operations validate against the [`TableSchema`]; an over-width text store
//! is the `RowTooLong` condition.

use gledger_error::{LedgerError, Result};

/// One field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Null,
    Text(String),
    U64(u64),
}

/// Column value kinds understood by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Fixed-length text with a declared byte width.
    FixedText { width: usize },
    /// Unsigned 64-bit integer.
    UnsignedBigint,
}

/// Declared shape of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

/// Declared shape of the ledger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Build a schema from its columns.
    #[must_use]
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// The ledger's canonical three-column schema: SID text plus the two
    /// GNO bounds, primary key `(column 0, column 1)`.
    #[must_use]
    pub fn ledger_default() -> Self {
        Self::new(vec![
            ColumnSpec {
                name: "source_id",
                kind: ColumnKind::FixedText { width: 32 },
            },
            ColumnSpec {
                name: "gno_start",
                kind: ColumnKind::UnsignedBigint,
            },
            ColumnSpec {
                name: "gno_end",
                kind: ColumnKind::UnsignedBigint,
            },
        ])
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column specs in ordinal order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }
}

/// An ordered field buffer matching a table's column layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowImage {
    fields: Vec<Datum>,
}

impl RowImage {
    /// A cleared record with `column_count` null fields.
    #[must_use]
    pub fn empty(column_count: usize) -> Self {
        Self {
            fields: vec![Datum::Null; column_count],
        }
    }

    /// Number of fields in the buffer.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Store a text value into `column`, enforcing the declared width.
    pub fn store_text(&mut self, schema: &TableSchema, column: usize, text: &str) -> Result<()> {
        let spec = schema
            .columns
            .get(column)
            .ok_or(LedgerError::RowTooLong { column })?;
        let slot = self
            .fields
            .get_mut(column)
            .ok_or(LedgerError::RowTooLong { column })?;
        match spec.kind {
            ColumnKind::FixedText { width } if text.len() <= width => {
                *slot = Datum::Text(text.to_owned());
                Ok(())
            }
            _ => Err(LedgerError::RowTooLong { column }),
        }
    }

    /// Store an unsigned 64-bit value into `column`.
    pub fn store_u64(&mut self, schema: &TableSchema, column: usize, value: u64) -> Result<()> {
        let spec = schema
            .columns
            .get(column)
            .ok_or(LedgerError::RowTooLong { column })?;
        let slot = self
            .fields
            .get_mut(column)
            .ok_or(LedgerError::RowTooLong { column })?;
        match spec.kind {
            ColumnKind::UnsignedBigint => {
                *slot = Datum::U64(value);
                Ok(())
            }
            ColumnKind::FixedText { .. } => Err(LedgerError::RowTooLong { column }),
        }
    }

    /// Read a text field, `None` when null or not text.
    #[must_use]
    pub fn text(&self, column: usize) -> Option<&str> {
        match self.fields.get(column) {
            Some(Datum::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Read an unsigned field, `None` when null or not an integer.
    #[must_use]
    pub fn u64(&self, column: usize) -> Option<u64> {
        match self.fields.get(column) {
            Some(Datum::U64(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Primary key of a ledger row: `(sid_text, gno_start)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub sid_text: String,
    pub gno_start: u64,
}

impl RowKey {
    /// Build a key.
    #[must_use]
    pub fn new(sid_text: impl Into<String>, gno_start: u64) -> Self {
        Self {
            sid_text: sid_text.into(),
            gno_start,
        }
    }

    /// Extract the key from a row image, failing on null or mistyped key
    /// columns.
    pub fn from_row(row: &RowImage) -> Result<Self> {
        let sid_text = row
            .text(0)
            .ok_or_else(|| LedgerError::storage("null or mistyped key column 0"))?;
        let gno_start = row
            .u64(1)
            .ok_or_else(|| LedgerError::storage("null or mistyped key column 1"))?;
        Ok(Self::new(sid_text, gno_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_shape() {
        let schema = TableSchema::ledger_default();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.columns()[0].name, "source_id");
        assert!(matches!(
            schema.columns()[0].kind,
            ColumnKind::FixedText { width: 32 }
        ));
    }

    #[test]
    fn store_text_enforces_width() {
        let schema = TableSchema::new(vec![ColumnSpec {
            name: "source_id",
            kind: ColumnKind::FixedText { width: 4 },
        }]);
        let mut row = RowImage::empty(1);
        row.store_text(&schema, 0, "abcd").unwrap();
        let err = row.store_text(&schema, 0, "abcde").unwrap_err();
        assert!(matches!(err, LedgerError::RowTooLong { column: 0 }));
    }

    #[test]
    fn store_kind_mismatch_is_rejected() {
        let schema = TableSchema::ledger_default();
        let mut row = RowImage::empty(3);
        assert!(row.store_u64(&schema, 0, 5).is_err());
        assert!(row.store_text(&schema, 1, "x").is_err());
        assert!(row.store_text(&schema, 9, "x").is_err());
    }

    #[test]
    fn key_extraction() {
        let schema = TableSchema::ledger_default();
        let mut row = RowImage::empty(3);
        row.store_text(&schema, 0, "ab").unwrap();
        row.store_u64(&schema, 1, 7).unwrap();
        row.store_u64(&schema, 2, 9).unwrap();
        assert_eq!(RowKey::from_row(&row).unwrap(), RowKey::new("ab", 7));

        let empty = RowImage::empty(3);
        assert!(RowKey::from_row(&empty).is_err());
    }

    #[test]
    fn key_order_is_sid_then_start() {
        let mut keys = vec![
            RowKey::new("bb", 1),
            RowKey::new("aa", 9),
            RowKey::new("aa", 2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                RowKey::new("aa", 2),
                RowKey::new("aa", 9),
                RowKey::new("bb", 1),
            ]
        );
    }
}
