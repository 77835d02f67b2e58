//! Record layout descriptor.
//!
//! Native records are C structs generated from the schema. The layout of
//! such a struct (field offsets, padding, total size) is computed here once,
//! using the same rules a C compiler applies, and every piece of code that
//! touches raw record bytes goes through it:
//!
//! ```text
//!   TableSchema ──► RecordLayout ──┬──► codegen   (struct typedef, field names)
//!                                  ├──► PageModule (record_size check)
//!                                  └──► RecordView (typed reads of native bytes)
//! ```
//!
//! | SQL type     | C field           | size / align |
//! |--------------|-------------------|--------------|
//! | `INT`        | `int32_t`         | 4 / 4        |
//! | `FLOAT`      | `double`          | 8 / 8        |
//! | `BOOLEAN`    | `bool`            | 1 / 1        |
//! | `VARCHAR(n)` | `char[n + 1]`     | n + 1 / 1    |
//! | `TEXT`       | `char[256]`       | 256 / 1      |
//! | `DATE`       | `char[11]`        | 11 / 1       |

use kiln_common::{DATE_CAPACITY, TEXT_CAPACITY};

use crate::parser::DataType;
use crate::schema::TableSchema;
use crate::value::{parse_date, Row, Value};

/// Position and size of one field inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// Output or column name.
    pub name: String,
    /// SQL type.
    pub data_type: DataType,
    /// Byte offset from the start of the record.
    pub offset: usize,
    /// Byte size.
    pub size: usize,
    /// Alignment requirement.
    pub align: usize,
}

impl FieldLayout {
    /// Positional C member name for field `index`.
    pub fn c_name(index: usize) -> String {
        format!("c{}", index)
    }
}

/// Returns the `(size, align)` of a type's native representation.
pub fn physical_size(data_type: &DataType) -> (usize, usize) {
    match data_type {
        DataType::Int => (4, 4),
        DataType::Float => (8, 8),
        DataType::Boolean => (1, 1),
        DataType::Varchar(n) => (*n as usize + 1, 1),
        DataType::Text => (TEXT_CAPACITY, 1),
        DataType::Date => (DATE_CAPACITY, 1),
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

/// Physical layout of a fixed-size record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    fields: Vec<FieldLayout>,
    size: usize,
    align: usize,
}

impl RecordLayout {
    /// Computes the layout for an ordered list of named fields.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut offset = 0;
        let mut max_align = 1;
        let mut out = Vec::new();

        for (name, data_type) in fields {
            let (size, align) = physical_size(&data_type);
            offset = align_up(offset, align);
            out.push(FieldLayout {
                name: name.into(),
                data_type,
                offset,
                size,
                align,
            });
            offset += size;
            max_align = max_align.max(align);
        }

        Self {
            fields: out,
            size: align_up(offset, max_align),
            align: max_align,
        }
    }

    /// Computes the layout of a table's records.
    pub fn for_schema(schema: &TableSchema) -> Self {
        Self::from_fields(
            schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.data_type)),
        )
    }

    /// Layout of a single `int32_t`, used by COUNT and position outputs.
    pub fn single_int(name: impl Into<String>) -> Self {
        Self::from_fields([(name.into(), DataType::Int)])
    }

    /// Total record size including trailing padding.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of the record.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Field layouts in order.
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Field layout by index.
    pub fn field(&self, index: usize) -> Option<&FieldLayout> {
        self.fields.get(index)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compact description of the physical type sequence.
    pub fn signature(&self) -> String {
        self.fields
            .iter()
            .map(|f| match f.data_type {
                DataType::Int => "i32".to_string(),
                DataType::Float => "f64".to_string(),
                DataType::Boolean => "b".to_string(),
                DataType::Date => format!("d{}", f.size),
                DataType::Varchar(_) | DataType::Text => format!("c{}", f.size),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Encodes a row into native record bytes.
    ///
    /// Missing or NULL values are written as zero bytes, strings are NUL
    /// padded and truncated to capacity.
    pub fn encode(&self, row: &Row) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        for (i, field) in self.fields.iter().enumerate() {
            let slot = &mut bytes[field.offset..field.offset + field.size];
            match row.get(i) {
                Some(Value::Int(v)) => slot.copy_from_slice(&v.to_ne_bytes()),
                Some(Value::Float(v)) => slot.copy_from_slice(&v.to_ne_bytes()),
                Some(Value::Boolean(b)) => slot[0] = u8::from(*b),
                Some(Value::String(s)) => {
                    let n = s.len().min(field.size - 1);
                    slot[..n].copy_from_slice(&s.as_bytes()[..n]);
                }
                Some(Value::Date(d)) => {
                    let s = d.format(crate::value::DATE_FORMAT).to_string();
                    let n = s.len().min(field.size - 1);
                    slot[..n].copy_from_slice(&s.as_bytes()[..n]);
                }
                Some(Value::Null) | None => {}
            }
        }
        bytes
    }
}

/// Typed, bounds-checked view over the bytes of one native record.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    bytes: &'a [u8],
    layout: &'a RecordLayout,
}

impl<'a> RecordView<'a> {
    /// Wraps `bytes`; returns `None` if they are shorter than the layout.
    pub fn new(bytes: &'a [u8], layout: &'a RecordLayout) -> Option<Self> {
        if bytes.len() < layout.size() {
            return None;
        }
        Some(Self {
            bytes: &bytes[..layout.size()],
            layout,
        })
    }

    /// Raw bytes of the record.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The layout this view decodes with.
    pub fn layout(&self) -> &'a RecordLayout {
        self.layout
    }

    /// Decodes field `index`.
    pub fn value(&self, index: usize) -> Option<Value> {
        let field = self.layout.field(index)?;
        let slot = &self.bytes[field.offset..field.offset + field.size];

        let value = match field.data_type {
            DataType::Int => Value::Int(i32::from_ne_bytes(slot.try_into().ok()?)),
            DataType::Float => Value::Float(f64::from_ne_bytes(slot.try_into().ok()?)),
            DataType::Boolean => Value::Boolean(slot[0] != 0),
            DataType::Varchar(_) | DataType::Text => Value::String(read_c_string(slot)),
            DataType::Date => {
                let s = read_c_string(slot);
                match parse_date(&s) {
                    Ok(date) => Value::Date(date),
                    Err(_) => Value::String(s),
                }
            }
        };
        Some(value)
    }

    /// Decodes field `index` as an integer.
    pub fn int(&self, index: usize) -> Option<i32> {
        match self.value(index)? {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Decodes all fields into an owned row.
    pub fn to_row(&self) -> Row {
        Row::new(
            (0..self.layout.len())
                .filter_map(|i| self.value(i))
                .collect(),
        )
    }
}

fn read_c_string(slot: &[u8]) -> String {
    let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}
