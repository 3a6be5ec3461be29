//! Explicit engine handle: owns the `name -> RelationInfo` catalog that the
//! source kept as a process-wide `gschema` singleton (see DESIGN.md).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::relation::RelationInfo;

#[derive(Default)]
pub struct Engine {
    relations: HashMap<String, RelationInfo>,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            relations: HashMap::new(),
        }
    }

    pub fn create_table(&mut self, relation: RelationInfo) -> Result<()> {
        if self.relations.contains_key(&relation.name) {
            return Err(Error::AlreadyExists(relation.name));
        }
        self.relations.insert(relation.name.clone(), relation);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&RelationInfo> {
        self.relations
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn drop_table(&mut self, name: &str) -> Result<RelationInfo> {
        self.relations
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{FieldInfo, FieldType};
    use std::path::PathBuf;

    fn relation(name: &str) -> RelationInfo {
        RelationInfo::new(
            name,
            vec![FieldInfo::new("id", 0, 8, FieldType::BigInt)],
            0,
            PathBuf::from(format!("{name}.dat")),
            PathBuf::from(format!("{name}.idx")),
        )
    }

    #[test]
    fn double_registration_fails() {
        let mut engine = Engine::new();
        engine.create_table(relation("people")).unwrap();
        assert!(engine.create_table(relation("people")).is_err());
    }

    #[test]
    fn lookup_missing_is_not_found() {
        let engine = Engine::new();
        assert!(matches!(engine.lookup("ghost"), Err(Error::NotFound(_))));
    }
}
