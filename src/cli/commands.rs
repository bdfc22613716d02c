//! CLI command implementations

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use querycraft::index::INDEX_DIR;
use querycraft::parser::literal::parse_literal;
use querycraft::schema::{self, load_schema, validate_schema, EntityMetadata, Schema};
use querycraft::{Database, QueryBuilder, SortDirection, Value};

use crate::config::Config;

/// Initialize a new project
pub fn init(path: &Path) -> Result<()> {
    println!("Initializing project at: {}", path.display());

    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create project directory: {}", path.display()))?;
    std::fs::create_dir_all(path.join(INDEX_DIR))?;

    if path.join("schema.yaml").exists() {
        println!("✓ Kept existing schema.yaml");
    } else {
        schema::create_default_schema(path)?;
        println!("✓ Created schema.yaml");
    }
    println!("✓ Created {}/ directory", INDEX_DIR);
    println!("\nProject initialized! Import documents with `qc import <dir>`.");

    Ok(())
}

/// Validate schema.yaml
pub fn check(root: &Path) -> Result<()> {
    println!("Checking schema: {}", root.join("schema.yaml").display());

    let schema = load_schema(root)?;
    let errors = validate_schema(&schema);

    for err in &errors {
        println!("ERROR: {}", err);
    }

    println!();
    if errors.is_empty() {
        println!("✓ No issues found in {} entities.", schema.entities.len());
    } else {
        println!("Found {} error(s) in {} entities.", errors.len(), schema.entities.len());
        std::process::exit(1);
    }

    Ok(())
}

/// Print entities, or one entity's fields and associations
pub fn schema(root: &Path, entity: Option<&str>) -> Result<()> {
    let schema = load_schema(root)?;

    let Some(entity) = entity else {
        if schema.entities.is_empty() {
            println!("No entities defined.");
        }
        for (name, definition) in &schema.entities {
            println!(
                "{} ({} fields, {} associations)",
                name,
                definition.fields.len(),
                definition.associations.len()
            );
        }
        return Ok(());
    };

    let Some(definition) = schema.entities.get(entity) else {
        bail!("Unknown entity '{}'", entity);
    };

    println!("{}", entity);
    println!("  fields:");
    for (name, field) in &definition.fields {
        println!("    {}: {:?}", name, field.field_type);
    }
    if !definition.associations.is_empty() {
        println!("  associations:");
        for (name, association) in &definition.associations {
            println!(
                "    {} -> {} ({:?})",
                name, association.entity, association.cardinality
            );
        }
    }

    Ok(())
}

/// One import file: documents for a single entity
#[derive(Debug, Deserialize)]
struct ImportFile {
    entity: String,
    documents: Vec<serde_json::Value>,
}

/// Import every `*.json` file under `dir`
pub fn import(root: &Path, dir: &Path) -> Result<()> {
    println!("Importing documents from: {}", dir.display());

    let schema = load_schema(root)?;
    let mut db = Database::open(root, Arc::new(schema))?;

    let mut file_count = 0;
    let mut document_count = 0;
    let mut error_count = 0;

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().extension().map_or(false, |ext| ext == "json")
                && !e.path().to_string_lossy().contains(INDEX_DIR)
        })
    {
        let file_path = entry.path();
        let relative_path = file_path.strip_prefix(dir).unwrap_or(file_path);

        let import: ImportFile = match std::fs::read_to_string(file_path)
            .map_err(anyhow::Error::from)
            .and_then(|c| serde_json::from_str(&c).map_err(anyhow::Error::from))
        {
            Ok(i) => i,
            Err(e) => {
                eprintln!("Error reading {}: {}", relative_path.display(), e);
                error_count += 1;
                continue;
            }
        };

        match db.insert_documents(&import.entity, &import.documents) {
            Ok(n) => {
                document_count += n;
                file_count += 1;
            }
            Err(e) => {
                eprintln!("Error importing {}: {}", relative_path.display(), e);
                error_count += 1;
            }
        }
    }

    println!();
    println!("✓ Imported {} documents from {} files", document_count, file_count);
    if error_count > 0 {
        println!("  {} errors", error_count);
    }

    Ok(())
}

/// Print the parsed form of an expression
pub fn parse(expression: &str) -> Result<()> {
    let parsed = querycraft::parser::parse(expression)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    /// Entity to query
    pub entity: String,

    /// Condition, AND'd with the others (repeatable)
    #[arg(long = "where", short = 'w')]
    pub wheres: Vec<String>,

    /// Condition opening its own OR-group (repeatable)
    #[arg(long = "or-where")]
    pub or_wheres: Vec<String>,

    /// Association to load, optionally aliased: path[:alias]
    #[arg(long = "with")]
    pub with: Vec<String>,

    /// Sorting: field[:asc|desc]
    #[arg(long = "order-by")]
    pub order_by: Vec<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub offset: Option<usize>,

    /// 1-based page; uses --per-page or the configured page size
    #[arg(long)]
    pub page: Option<usize>,

    #[arg(long)]
    pub per_page: Option<usize>,

    /// Parameter binding: name=value (repeatable)
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Print the number of matches only
    #[arg(long)]
    pub count: bool,

    /// Print the compiled criteria instead of executing
    #[arg(long)]
    pub compile: bool,
}

/// Build and run a query from command-line arguments
pub fn query(root: &Path, args: &QueryArgs, config: &Config) -> Result<()> {
    let schema = load_schema(root)?;
    let metadata: Arc<dyn EntityMetadata> = Arc::new(schema);

    let mut builder = build_query(args, Arc::clone(&metadata), config)?;

    if args.compile {
        let criteria = builder.build()?;
        println!("{}", serde_json::to_string_pretty(&criteria)?);
        return Ok(());
    }

    let db = Database::open(root, Arc::clone(&metadata))?;
    builder = builder.with_repository(Arc::new(db));

    if args.count {
        println!("{}", builder.count()?);
    } else if builder.pagination().is_some() {
        println!("{}", serde_json::to_string_pretty(&builder.get_paginated()?)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&builder.search()?)?);
    }

    Ok(())
}

/// Associations come first so their aliases are known to the conditions
fn build_query(args: &QueryArgs, metadata: Arc<dyn EntityMetadata>, config: &Config) -> Result<QueryBuilder> {
    let mut builder = QueryBuilder::new(&args.entity, metadata)?;

    for spec in &args.with {
        match split_association(spec) {
            (path, Some(alias)) => builder.with_alias(path, alias)?,
            (path, None) => builder.with(path)?,
        };
    }
    for expression in &args.wheres {
        builder.and_where(expression)?;
    }
    for expression in &args.or_wheres {
        builder.or_where(expression)?;
    }
    for spec in &args.order_by {
        let (field, direction) = split_sorting(spec)?;
        builder.order_by(field, direction)?;
    }
    for spec in &args.params {
        let (name, value) = split_parameter(spec)?;
        builder.set_parameter(name, value)?;
    }

    if let Some(limit) = args.limit {
        builder.limit(limit);
    }
    if let Some(offset) = args.offset {
        builder.offset(offset);
    }
    if let Some(page) = args.page {
        builder.paginate(page, args.per_page.unwrap_or_else(|| config.per_page()))?;
    }

    Ok(builder)
}

/// Show index statistics
pub fn stats(root: &Path) -> Result<()> {
    let db = Database::open(root, Arc::new(Schema::default()))?;
    let stats = db.stats()?;

    println!("Index Statistics");
    println!("================");
    println!("Documents: {}", stats.document_count);
    for (entity, count) in &stats.entities {
        println!("  {:<24} {}", entity, count);
    }

    Ok(())
}

fn split_association(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(':') {
        Some((path, alias)) => (path.trim(), Some(alias.trim())),
        None => (spec.trim(), None),
    }
}

fn split_sorting(spec: &str) -> Result<(&str, SortDirection)> {
    match spec.split_once(':') {
        Some((field, direction)) => Ok((field.trim(), direction.parse()?)),
        None => Ok((spec.trim(), SortDirection::Asc)),
    }
}

fn split_parameter(spec: &str) -> Result<(&str, Value)> {
    let Some((name, value)) = spec.split_once('=') else {
        bail!("Invalid parameter '{}': expected name=value", spec);
    };
    Ok((name.trim(), parse_literal(value.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
entities:
  product:
    fields:
      name:
        type: string
      stock:
        type: int
    associations:
      manufacturer:
        entity: product_manufacturer
  product_manufacturer:
    fields:
      name:
        type: string
"#;

    fn metadata() -> Arc<dyn EntityMetadata> {
        Arc::new(schema::parse_schema(SCHEMA).unwrap())
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_association("manufacturer:m"), ("manufacturer", Some("m")));
        assert_eq!(split_association("manufacturer.country"), ("manufacturer.country", None));

        assert_eq!(split_sorting("price:desc").unwrap(), ("price", SortDirection::Desc));
        assert_eq!(split_sorting("price").unwrap(), ("price", SortDirection::Asc));
        assert!(split_sorting("price:up").is_err());

        assert_eq!(split_parameter("min=10").unwrap(), ("min", Value::Int(10)));
        assert_eq!(split_parameter("name='Acme'").unwrap(), ("name", Value::from("Acme")));
        assert!(split_parameter("min").is_err());
    }

    #[test]
    fn test_build_query_from_args() {
        let args = QueryArgs {
            entity: "product".to_string(),
            wheres: vec!["m.name = :brand".to_string()],
            with: vec!["manufacturer:m".to_string()],
            order_by: vec!["stock:desc".to_string()],
            params: vec!["brand=Acme".to_string()],
            page: Some(2),
            ..QueryArgs::default()
        };

        let config = Config {
            per_page: Some(5),
            ..Config::default()
        };
        let builder = build_query(&args, metadata(), &config).unwrap();
        let criteria = builder.build().unwrap();

        assert!(criteria.has_association("manufacturer"));
        assert_eq!(criteria.filters.len(), 1);
        assert_eq!(criteria.filters[0].field(), Some("manufacturer.name"));
        assert_eq!(criteria.limit, Some(5));
        assert_eq!(criteria.offset, Some(5));
    }

    #[test]
    fn test_import_and_query_roundtrip() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.yaml"), SCHEMA).unwrap();

        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(
            data.join("products.json"),
            r#"{"entity": "product", "documents": [
                {"id": "a", "name": "Shirt", "stock": 3},
                {"id": "b", "name": "Shoes", "stock": 0}
            ]}"#,
        )
        .unwrap();
        std::fs::write(data.join("broken.json"), "{ not json").unwrap();

        import(dir.path(), &data).unwrap();

        let metadata = metadata();
        let db = Database::open(dir.path(), Arc::clone(&metadata)).unwrap();
        assert_eq!(db.stats().unwrap().document_count, 2);

        let mut builder = QueryBuilder::new("product", metadata)
            .unwrap()
            .with_repository(Arc::new(db));
        builder.and_where("stock > 0").unwrap();
        assert_eq!(builder.get_ids().unwrap(), vec!["a"]);
    }
}
