//! Typed decoding of records.
//!
//! The column type decides how each cell is retrieved and what [`CellValue`]
//! variant it becomes. Two type codes need special handling:
//!
//! - Code 14 is read as a plain 4-byte signed integer.
//! - Code 15 is used both for 64-bit counters and for tick timestamps. Each
//!   value goes through [`try_interpret_as_timestamp`] and is kept as an
//!   integer unless it lands in a plausible time window.
//!
//! Columns of any other unhandled type decode to [`CellValue::Null`] and are
//! reported once, when the decoder is built.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::{
    catalog::{column::ColumnDescriptor, ty::ColumnType},
    engine::{Engine, SessionId, TableId},
    error::{DbResult, Error},
    exec::{row::Row, value::CellValue},
    util::time::try_interpret_as_timestamp,
};

/// A column whose type the decoder can't interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub column: String,
    pub code: u32,
}

/// Decodes the current record of a table cursor, for a fixed column set.
#[derive(Debug)]
pub struct RowDecoder {
    columns: Vec<ColumnDescriptor>,
    warnings: Vec<DecodeWarning>,
    upper_bound_now: DateTime<Utc>,
    future_time_limit: Duration,
    binary_as_bytes: bool,
}

impl RowDecoder {
    /// Creates a decoder for the given columns. `now` and `future_time_limit`
    /// bound the code 15 timestamp heuristic; `now` is fixed for the lifetime
    /// of the decoder so that every row of a table is judged alike.
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        future_time_limit: Duration,
        now: DateTime<Utc>,
        binary_as_bytes: bool,
    ) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(Error::EmptyColumnSet);
        }
        let warnings = columns
            .iter()
            .filter(|column| !is_decodable(column.ty))
            .map(|column| {
                warn!(column = %column.name, code = column.ty.code(), "unknown column type");
                DecodeWarning {
                    column: column.name.clone(),
                    code: column.ty.code(),
                }
            })
            .collect();
        Ok(RowDecoder {
            columns,
            warnings,
            upper_bound_now: now,
            future_time_limit,
            binary_as_bytes,
        })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Columns that always decode to null.
    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    /// Decodes the record the cursor is positioned on. Any retrieval failure
    /// aborts the whole row.
    pub fn decode<E: Engine + ?Sized>(
        &self,
        engine: &E,
        session: SessionId,
        table: TableId,
    ) -> DbResult<Row> {
        let mut row = Row::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = self.decode_cell(engine, session, table, column)?;
            row.insert(column.name.as_str(), value);
        }
        Ok(row)
    }

    fn decode_cell<E: Engine + ?Sized>(
        &self,
        engine: &E,
        s: SessionId,
        t: TableId,
        column: &ColumnDescriptor,
    ) -> DbResult<CellValue> {
        let c = column.id;
        let value: CellValue = match column.ty {
            ColumnType::Bit => engine.retrieve_bool(s, t, c)?.into(),
            ColumnType::DateTime => match engine.retrieve_date_time(s, t, c)? {
                Some(Ok(timestamp)) => CellValue::Timestamp(timestamp),
                Some(Err(days)) => CellValue::Float64(days),
                None => CellValue::Null,
            },
            ColumnType::IeeeDouble => engine.retrieve_f64(s, t, c)?.into(),
            ColumnType::IeeeSingle => engine.retrieve_f32(s, t, c)?.into(),
            ColumnType::Long | ColumnType::UnsignedLong => engine.retrieve_i32(s, t, c)?.into(),
            ColumnType::Short => engine.retrieve_i16(s, t, c)?.into(),
            ColumnType::UnsignedByte => engine.retrieve_u8(s, t, c)?.map(i16::from).into(),
            ty if ty.is_binary() && self.binary_as_bytes => engine.retrieve_bytes(s, t, c)?.into(),
            ty if ty.is_textual() => engine.retrieve_string(s, t, c)?.into(),
            ColumnType::LongLong => match engine.retrieve_i64(s, t, c)? {
                Some(raw) => try_interpret_as_timestamp(
                    raw,
                    self.upper_bound_now,
                    self.future_time_limit,
                )
                .map_or(CellValue::Int64(raw), CellValue::Timestamp),
                None => CellValue::Null,
            },
            _ => CellValue::Null,
        };
        Ok(value)
    }
}

fn is_decodable(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::Bit
            | ColumnType::DateTime
            | ColumnType::IeeeDouble
            | ColumnType::IeeeSingle
            | ColumnType::Long
            | ColumnType::UnsignedLong
            | ColumnType::Short
            | ColumnType::UnsignedByte
            | ColumnType::LongLong
    ) || ty.is_textual()
}
