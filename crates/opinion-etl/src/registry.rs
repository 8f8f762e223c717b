//! Schema registry
//!
//! Maps each logical table to its source file, its column renames and the
//! foreign-key rules its rows must satisfy. The registry also carries the
//! load plan: an ordered list of table groups where every group may only
//! reference tables from earlier groups. The registry is built once at
//! startup and never mutated afterwards.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// `table.column` reference used by foreign-key rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok(ColumnRef::new(table, column))
            },
            _ => Err(format!("expected 'table.column', got '{}'", value)),
        }
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// A row's `column` value must exist in `references`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRule {
    /// Column in the dependent table, after renaming
    pub column: String,
    pub references: ColumnRef,
}

impl ForeignKeyRule {
    pub fn new(column: impl Into<String>, references: ColumnRef) -> Self {
        Self {
            column: column.into(),
            references,
        }
    }
}

/// One logical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Logical (target) table name
    pub name: String,

    /// Source file name, relative to the data directory
    pub file: String,

    /// Source column → target column
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRule>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            columns: BTreeMap::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn rename(mut self, source: &str, target: &str) -> Self {
        self.columns.insert(source.to_string(), target.to_string());
        self
    }

    /// Identity mapping entries for columns loaded under their source name
    pub fn keep(mut self, columns: &[&str]) -> Self {
        for column in columns {
            self.columns.insert(column.to_string(), column.to_string());
        }
        self
    }

    pub fn foreign_key(mut self, column: &str, references: ColumnRef) -> Self {
        self.foreign_keys.push(ForeignKeyRule::new(column, references));
        self
    }

    pub fn is_dependent(&self) -> bool {
        !self.foreign_keys.is_empty()
    }
}

/// Tables that may be loaded once every earlier group has been loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGroup {
    pub name: String,
    pub tables: Vec<String>,
}

impl TableGroup {
    pub fn new(name: impl Into<String>, tables: &[&str]) -> Self {
        Self {
            name: name.into(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Ordered table groups: references first, dependents after
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadPlan {
    groups: Vec<TableGroup>,
}

impl LoadPlan {
    pub fn new(groups: Vec<TableGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[TableGroup] {
        &self.groups
    }

    /// Table names in load order
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.tables.iter().map(String::as_str))
    }

    /// Position of the group containing `table`
    pub fn group_of(&self, table: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.tables.iter().any(|t| t == table))
    }
}

/// Immutable table registry plus load plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    tables: Vec<TableDefinition>,
    load_plan: LoadPlan,
}

impl SchemaRegistry {
    /// Build and validate a registry
    pub fn new(tables: Vec<TableDefinition>, load_plan: LoadPlan) -> Result<Self> {
        let registry = Self { tables, load_plan };
        registry.validate()?;
        Ok(registry)
    }

    /// Parse and validate a YAML registry document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let registry: SchemaRegistry = serde_yaml::from_str(content)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load a registry from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!("cannot read registry '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// The customer-opinion tables: clients, products and data sources as
    /// references; surveys, social comments and web reviews as dependents.
    pub fn customer_opinions() -> Self {
        let client = ColumnRef::new("clientes", "IdCliente");
        let product = ColumnRef::new("productos", "IdProducto");

        let tables = vec![
            TableDefinition::new("clientes", "clients.csv").keep(&["IdCliente", "Nombre", "Email"]),
            TableDefinition::new("productos", "products.csv")
                .keep(&["IdProducto", "Nombre"])
                .rename("Categoría", "Categoria"),
            TableDefinition::new("fuentes", "fuente_datos.csv").keep(&[
                "IdFuente",
                "TipoFuente",
                "FechaCarga",
            ]),
            TableDefinition::new("encuestas", "surveys_part1.csv")
                .keep(&[
                    "IdOpinion",
                    "IdCliente",
                    "IdProducto",
                    "Fecha",
                    "Comentario",
                    "Clasificacion",
                    "PuntajeSatisfaccion",
                    "FuenteTexto",
                ])
                .foreign_key("IdCliente", client.clone())
                .foreign_key("IdProducto", product.clone()),
            TableDefinition::new("comentarios_sociales", "social_comments.csv")
                .keep(&["IdComment", "IdCliente", "IdProducto", "Fecha", "Comentario"])
                .rename("Fuente", "FuenteTexto")
                .foreign_key("IdCliente", client.clone())
                .foreign_key("IdProducto", product.clone()),
            TableDefinition::new("resenas_web", "web_reviews.csv")
                .keep(&["IdReview", "IdCliente", "IdProducto", "Fecha", "Comentario", "Rating"])
                .foreign_key("IdCliente", client)
                .foreign_key("IdProducto", product),
        ];

        let load_plan = LoadPlan::new(vec![
            TableGroup::new("references", &["clientes", "productos", "fuentes"]),
            TableGroup::new(
                "dependents",
                &["encuestas", "comentarios_sociales", "resenas_web"],
            ),
        ]);

        Self { tables, load_plan }
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn load_plan(&self) -> &LoadPlan {
        &self.load_plan
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table definitions in load order
    pub fn in_load_order(&self) -> impl Iterator<Item = &TableDefinition> {
        self.load_plan.tables().filter_map(|name| self.table(name))
    }

    /// Check the invariants the pipeline relies on.
    ///
    /// - table names and files are non-empty, names unique
    /// - every table sits in exactly one load group and groups name only
    ///   defined tables
    /// - every foreign key points at a table in an earlier group
    /// - renames are neither chained nor many-to-one
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(EtlError::registry("no tables defined"));
        }

        let mut names = HashSet::new();
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(EtlError::registry("table name cannot be empty"));
            }
            if table.file.trim().is_empty() {
                return Err(EtlError::registry(format!(
                    "table '{}' has no source file",
                    table.name
                )));
            }
            if !names.insert(table.name.as_str()) {
                return Err(EtlError::registry(format!("duplicate table '{}'", table.name)));
            }
            validate_renames(table)?;
        }

        let mut placement: HashMap<&str, usize> = HashMap::new();
        for (index, group) in self.load_plan.groups().iter().enumerate() {
            for table in &group.tables {
                if !names.contains(table.as_str()) {
                    return Err(EtlError::registry(format!(
                        "load group '{}' names unknown table '{}'",
                        group.name, table
                    )));
                }
                if placement.insert(table.as_str(), index).is_some() {
                    return Err(EtlError::registry(format!(
                        "table '{}' appears more than once in the load plan",
                        table
                    )));
                }
            }
        }

        for table in &self.tables {
            let Some(&own_group) = placement.get(table.name.as_str()) else {
                return Err(EtlError::registry(format!(
                    "table '{}' is missing from the load plan",
                    table.name
                )));
            };

            for rule in &table.foreign_keys {
                if rule.column.trim().is_empty() || rule.references.column.trim().is_empty() {
                    return Err(EtlError::registry(format!(
                        "table '{}' has a foreign key with an empty column",
                        table.name
                    )));
                }
                match placement.get(rule.references.table.as_str()) {
                    None => {
                        return Err(EtlError::registry(format!(
                            "table '{}' references unknown table '{}'",
                            table.name, rule.references.table
                        )))
                    },
                    Some(&group) if group >= own_group => {
                        return Err(EtlError::registry(format!(
                            "table '{}' references '{}', which is not loaded in an earlier group",
                            table.name, rule.references.table
                        )))
                    },
                    Some(_) => {},
                }
            }
        }

        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::customer_opinions()
    }
}

fn validate_renames(table: &TableDefinition) -> Result<()> {
    let mut targets = HashSet::new();
    for (source, target) in &table.columns {
        if target.trim().is_empty() {
            return Err(EtlError::registry(format!(
                "table '{}' renames '{}' to an empty name",
                table.name, source
            )));
        }
        if !targets.insert(target.as_str()) {
            return Err(EtlError::registry(format!(
                "table '{}' maps more than one column to '{}'",
                table.name, target
            )));
        }
        if source != target && table.columns.contains_key(target) {
            return Err(EtlError::registry(format!(
                "table '{}' chains renames through '{}'",
                table.name, target
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid() {
        let registry = SchemaRegistry::customer_opinions();
        registry.validate().unwrap();
        assert_eq!(registry.tables().len(), 6);

        let order: Vec<&str> = registry.load_plan().tables().collect();
        assert_eq!(
            order,
            vec![
                "clientes",
                "productos",
                "fuentes",
                "encuestas",
                "comentarios_sociales",
                "resenas_web"
            ]
        );
    }

    #[test]
    fn test_dependents_reference_clients_and_products() {
        let registry = SchemaRegistry::customer_opinions();
        for name in ["encuestas", "comentarios_sociales", "resenas_web"] {
            let table = registry.table(name).unwrap();
            let refs: Vec<String> = table
                .foreign_keys
                .iter()
                .map(|r| r.references.to_string())
                .collect();
            assert_eq!(refs, vec!["clientes.IdCliente", "productos.IdProducto"]);
        }
        assert!(!registry.table("clientes").unwrap().is_dependent());
    }

    #[test]
    fn test_rejects_reference_to_same_group() {
        let tables = vec![
            TableDefinition::new("a", "a.csv"),
            TableDefinition::new("b", "b.csv").foreign_key("x", ColumnRef::new("a", "x")),
        ];
        let plan = LoadPlan::new(vec![TableGroup::new("all", &["a", "b"])]);
        let err = SchemaRegistry::new(tables, plan).unwrap_err();
        assert!(err.to_string().contains("earlier group"));
    }

    #[test]
    fn test_rejects_table_missing_from_plan() {
        let tables = vec![TableDefinition::new("a", "a.csv"), TableDefinition::new("b", "b.csv")];
        let plan = LoadPlan::new(vec![TableGroup::new("refs", &["a"])]);
        assert!(SchemaRegistry::new(tables, plan).is_err());
    }

    #[test]
    fn test_rejects_chained_renames() {
        let tables = vec![TableDefinition::new("a", "a.csv")
            .rename("x", "y")
            .rename("y", "z")];
        let plan = LoadPlan::new(vec![TableGroup::new("refs", &["a"])]);
        let err = SchemaRegistry::new(tables, plan).unwrap_err();
        assert!(err.to_string().contains("chains"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
tables:
  - name: clientes
    file: clients.csv
    columns:
      IdCliente: IdCliente
  - name: resenas_web
    file: web_reviews.csv
    foreign_keys:
      - column: IdCliente
        references: clientes.IdCliente
load_plan:
  - name: references
    tables: [clientes]
  - name: dependents
    tables: [resenas_web]
"#;
        let registry = SchemaRegistry::from_yaml_str(yaml).unwrap();
        let reviews = registry.table("resenas_web").unwrap();
        assert_eq!(
            reviews.foreign_keys[0].references,
            ColumnRef::new("clientes", "IdCliente")
        );
        assert_eq!(registry.load_plan().group_of("resenas_web"), Some(1));
    }

    #[test]
    fn test_column_ref_rejects_bare_names() {
        assert!(ColumnRef::try_from("clientes".to_string()).is_err());
        assert!(ColumnRef::try_from(".IdCliente".to_string()).is_err());
    }
}
