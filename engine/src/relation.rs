use std::path::PathBuf;

/// Scalar field types the engine knows how to compare. Mirrors the
/// `BIGINT`/`CHAR`/`VARCHAR` vocabulary used by the schema fixtures this
/// engine's on-disk format was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    BigInt,
    Char,
    VarChar,
}

impl FieldType {
    /// Strict-less-than over raw byte spans. Must be a strict weak order;
    /// callers derive equality as `!lt(a,b) && !lt(b,a)`.
    pub fn lt(&self, a: &[u8], b: &[u8]) -> bool {
        match self {
            FieldType::BigInt => {
                let ai = i64::from_be_bytes(a.try_into().expect("BIGINT field is 8 bytes"));
                let bi = i64::from_be_bytes(b.try_into().expect("BIGINT field is 8 bytes"));
                ai < bi
            }
            FieldType::Char | FieldType::VarChar => a < b,
        }
    }

    pub fn eq(&self, a: &[u8], b: &[u8]) -> bool {
        !self.lt(a, b) && !self.lt(b, a)
    }
}

/// One column of a relation. A positive `length` is fixed width; a negative
/// `length` is the maximum width of a `VarChar` column.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub index: usize,
    pub length: i32,
    pub field_type: FieldType,
}

impl FieldInfo {
    pub fn new(name: &str, index: usize, length: i32, field_type: FieldType) -> Self {
        FieldInfo {
            name: name.to_string(),
            index,
            length,
            field_type,
        }
    }

    /// Maximum byte width this field ever occupies on disk.
    pub fn max_width(&self) -> usize {
        self.length.unsigned_abs() as usize
    }
}

/// The schema catalog entry for one clustered table: its field list, which
/// field is the clustered key, and where its two files live.
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub name: String,
    pub fields: Vec<FieldInfo>,
    pub key: usize,
    pub data_path: PathBuf,
    pub index_path: PathBuf,
}

impl RelationInfo {
    pub fn new(
        name: &str,
        fields: Vec<FieldInfo>,
        key: usize,
        data_path: PathBuf,
        index_path: PathBuf,
    ) -> Self {
        RelationInfo {
            name: name.to_string(),
            fields,
            key,
            data_path,
            index_path,
        }
    }

    pub fn key_field(&self) -> &FieldInfo {
        &self.fields[self.key]
    }

    /// `true` if `a < b` under the key column's total order.
    pub fn key_lt(&self, a: &[u8], b: &[u8]) -> bool {
        self.key_field().field_type.lt(a, b)
    }

    pub fn key_eq(&self, a: &[u8], b: &[u8]) -> bool {
        self.key_field().field_type.eq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_orders_numerically_not_lexically() {
        let small = 1i64.to_be_bytes();
        let big = 256i64.to_be_bytes();
        assert!(FieldType::BigInt.lt(&small, &big));
        assert!(!FieldType::BigInt.lt(&big, &small));
    }

    #[test]
    fn char_orders_lexically() {
        assert!(FieldType::Char.lt(b"abc", b"abd"));
        assert!(FieldType::Char.eq(b"abc", b"abc"));
    }
}
