//! Numeric coercion of column values.
//!
//! Each column's declared type resolves, once per call, to an optional
//! coercion function. Columns whose type cannot be read as floating point get
//! none and always produce NaN.

use crate::db::{TupleDescriptor, Value};

/// Converts one non-null cell to `f64`.
pub type CoerceFn = fn(&Value) -> f64;

/// Returns the coercion function for a declared type name, if it has one.
pub fn resolve(type_name: &str) -> Option<CoerceFn> {
    match type_name.trim().to_lowercase().as_str() {
        "float4" | "float8" | "real" | "double precision" | "numeric" | "decimal" | "int2"
        | "int4" | "int8" | "smallint" | "integer" | "int" | "bigint" | "oid" => {
            Some(number_to_f64)
        }
        _ => None,
    }
}

/// Either numeric variant reads as `f64`, whatever the declared type.
fn number_to_f64(value: &Value) -> f64 {
    match value {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        _ => f64::NAN,
    }
}

/// Where a declared attribute lands in the output.
#[derive(Clone, Copy)]
pub enum Slot {
    /// Logically deleted; occupies no output column.
    Dropped,
    Active {
        /// Output column index.
        output: usize,
        coerce: Option<CoerceFn>,
    },
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dropped => write!(f, "Dropped"),
            Self::Active { output, coerce } => f
                .debug_struct("Active")
                .field("output", output)
                .field("numeric", &coerce.is_some())
                .finish(),
        }
    }
}

/// Column layout resolved from a descriptor, one slot per declared attribute.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    slots: Vec<Slot>,
    width: usize,
}

impl ColumnPlan {
    /// Resolves coercions and output positions for every attribute.
    pub fn resolve(descriptor: &TupleDescriptor) -> Self {
        let mut width = 0;
        let slots = descriptor
            .columns()
            .iter()
            .map(|col| {
                if col.dropped {
                    return Slot::Dropped;
                }
                let slot = Slot::Active {
                    output: width,
                    coerce: resolve(&col.type_name),
                };
                width += 1;
                slot
            })
            .collect();

        Self { slots, width }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of declared attributes.
    pub fn natts(&self) -> usize {
        self.slots.len()
    }

    /// Number of output columns.
    pub fn width(&self) -> usize {
        self.width
    }
}
