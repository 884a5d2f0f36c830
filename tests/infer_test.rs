//! Integration tests for implied relationship inference.

use schemascope::catalog::{ModelBuilder, StaticCatalog, StaticTable};
use schemascope::config::AnalysisConfig;
use schemascope::infer::{find_convention_constraints, find_implied_constraints, InferOptions};
use schemascope::model::Database;

fn build(catalog: StaticCatalog) -> Database {
    ModelBuilder::new(&catalog, &AnalysisConfig::default())
        .build("test")
        .unwrap()
}

fn keyed(name: &str, pk: &str) -> StaticTable {
    StaticTable::new(name)
        .not_null_column(pk, "int")
        .primary_key(&[pk])
}

#[test]
fn test_generic_key_names_abort_inference() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("alpha", "id"))
            .with_table(keyed("beta", "id").column("alpha_id", "int"))
            .with_table(keyed("gamma", "id")),
    );

    let implied = find_implied_constraints(&mut db, InferOptions::default());
    assert!(implied.is_empty());
    assert_eq!(db.implied_constraints().count(), 0);
}

#[test]
fn test_duplicate_ratio_can_be_loosened() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("alpha", "id"))
            .with_table(keyed("beta", "id").column("alpha_id", "int"))
            .with_table(keyed("gamma", "id")),
    );

    let implied = find_implied_constraints(
        &mut db,
        InferOptions {
            max_duplicate_ratio: 5.0,
        },
    );
    assert_eq!(implied.len(), 1);
    assert_eq!(
        db.constraint_label(implied[0]),
        "Implied Constraint beta(alpha_id) -> alpha(id)"
    );
}

#[test]
fn test_alias_match_links_child_to_parent() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("authors", "id").column("name", "varchar"))
            .with_table(keyed("books", "id").column("author_id", "int")),
    );

    let implied = find_implied_constraints(&mut db, InferOptions::default());
    assert_eq!(implied.len(), 1);

    let fk = db.constraint(implied[0]);
    assert!(fk.implied);
    assert_eq!(fk.name, None);
    assert_eq!(db.table(fk.parent_table).name, "authors");
    assert_eq!(db.table(fk.child_table).name, "books");

    let books = db.get_table("books").unwrap();
    let author_id = books.get_column("author_id").unwrap();
    assert_eq!(author_id.parents.len(), 1);
    let parent = *author_id.parents.keys().next().unwrap();
    assert_eq!(db.qualified_column_name(parent), "authors.id");
    assert_eq!(db.column(parent).children.len(), 1);

    // Shared `id` keys never link to each other
    assert!(books.get_column("id").unwrap().parents.is_empty());
}

#[test]
fn test_exact_name_match() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("customer", "customer_id"))
            .with_table(keyed("invoice", "invoice_id").column("customer_id", "int")),
    );

    let implied = find_implied_constraints(&mut db, InferOptions::default());
    assert_eq!(implied.len(), 1);
    assert_eq!(
        db.constraint_label(implied[0]),
        "Implied Constraint invoice(customer_id) -> customer(customer_id)"
    );
}

#[test]
fn test_view_columns_can_be_implied_children() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("customer", "customer_id"))
            .with_table(StaticTable::view("customer_summary").column("customer_id", "int")),
    );

    let implied = find_implied_constraints(&mut db, InferOptions::default());
    assert_eq!(implied.len(), 1);
    assert_eq!(
        db.constraint_label(implied[0]),
        "Implied Constraint customer_summary(customer_id) -> customer(customer_id)"
    );

    // Views still take no part in ordering
    let order = db.dependency_graph(true).order();
    assert_eq!(order.insertion.len(), 1);
    assert!(order.sacrificed.is_empty());
}

#[test]
fn test_type_mismatch_is_not_matched() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("customer", "customer_id"))
            .with_table(keyed("invoice", "invoice_id").column("customer_id", "varchar")),
    );

    assert!(find_implied_constraints(&mut db, InferOptions::default()).is_empty());
}

#[test]
fn test_real_relationship_suppresses_inference() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("authors", "id"))
            .with_table(keyed("books", "id").column("author_id", "int").foreign_key(
                "fk_books_author",
                &["author_id"],
                "authors",
                &["id"],
            )),
    );

    assert!(find_implied_constraints(&mut db, InferOptions::default()).is_empty());
    assert_eq!(db.real_constraints().count(), 1);
}

#[test]
fn test_disabled_columns_are_ignored() {
    let catalog = StaticCatalog::new(None)
        .with_table(keyed("authors", "id"))
        .with_table(keyed("books", "id").column("author_id", "int"));
    let mut config = AnalysisConfig::default();
    config.implied.disabled_columns = vec!["books\\.author_id".to_string()];
    let mut db = ModelBuilder::new(&catalog, &config).build("test").unwrap();

    assert!(find_implied_constraints(&mut db, InferOptions::default()).is_empty());
}

#[test]
fn test_composite_keys_are_not_targets() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(
                StaticTable::new("ledger")
                    .not_null_column("ledger_id", "int")
                    .not_null_column("year", "int")
                    .primary_key(&["ledger_id", "year"]),
            )
            .with_table(keyed("entry", "entry_id").column("ledger_id", "int")),
    );

    assert!(find_implied_constraints(&mut db, InferOptions::default()).is_empty());
}

#[test]
fn test_inference_is_deterministic() {
    let catalog = || {
        StaticCatalog::new(None)
            .with_table(keyed("authors", "id"))
            .with_table(keyed("publishers", "publisher_id"))
            .with_table(
                keyed("books", "id")
                    .column("author_id", "int")
                    .column("publisher_id", "int"),
            )
            .with_table(keyed("reviews", "review_id").column("publisher_id", "int"))
    };

    let labels = |mut db: Database| {
        let ids = find_implied_constraints(&mut db, InferOptions::default());
        ids.into_iter()
            .map(|id| db.constraint_label(id))
            .collect::<Vec<_>>()
    };

    let first = labels(build(catalog()));
    let second = labels(build(catalog()));
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    // Candidates are visited in (table, column) order
    assert!(first[0].ends_with("books(author_id) -> authors(id)"));
    assert!(first[2].ends_with("reviews(publisher_id) -> publishers(publisher_id)"));
}

#[test]
fn test_convention_matching() {
    let mut db = build(
        StaticCatalog::new(None)
            .with_table(keyed("categories", "id"))
            .with_table(keyed("products", "id").column("category_id", "int"))
            .with_table(keyed("variants", "id").column("product_id", "int"))
            .with_table(keyed("stock", "id").column("warehouse_id", "int")),
    );

    let implied = find_convention_constraints(&mut db);
    let labels: Vec<String> = implied.iter().map(|&id| db.constraint_label(id)).collect();
    assert_eq!(
        labels,
        vec![
            "Implied Constraint products(category_id) -> categories(id)",
            "Implied Constraint variants(product_id) -> products(id)",
        ]
    );
}
