//! Integration tests for building a model from catalog metadata.

use schemascope::catalog::{ModelBuilder, QueryResult, StaticCatalog, StaticForeignKey, StaticTable};
use schemascope::config::AnalysisConfig;
use schemascope::error::BuildError;
use schemascope::model::{Database, ReferentialAction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn shop_catalog() -> StaticCatalog {
    StaticCatalog::new(Some("shop"))
        .with_table(
            StaticTable::new("customers")
                .not_null_column("id", "int")
                .column("email", "varchar")
                .primary_key(&["id"])
                .index("customers_pk", &["id"], true)
                .index("customers_email", &["email"], true)
                .rows(10),
        )
        .with_table(
            StaticTable::new("orders")
                .not_null_column("id", "int")
                .column("customer_id", "int")
                .column("placed_at", "timestamp")
                .primary_key(&["id"])
                .foreign_key("fk_orders_customer", &["customer_id"], "customers", &["id"])
                .rows(25),
        )
        .with_table(
            StaticTable::new("order_items")
                .not_null_column("order_id", "int")
                .not_null_column("line", "int")
                .column("sku", "varchar")
                .primary_key(&["order_id", "line"])
                .foreign_key("fk_items_order", &["order_id"], "orders", &["id"])
                .rows(80),
        )
        .with_table(StaticTable::view("big_orders").column("id", "int"))
}

fn build(catalog: &StaticCatalog, config: &AnalysisConfig) -> Result<Database, BuildError> {
    ModelBuilder::new(catalog, config).build("shop")
}

/// Structural description used to compare two builds
fn fingerprint(db: &Database) -> Vec<String> {
    let mut lines = Vec::new();
    for table in db.all() {
        lines.push(format!("{} {} view={}", table.id, table.name, table.is_view()));
        for column in &table.columns {
            let parents: Vec<String> = column
                .parents
                .iter()
                .map(|(p, fk)| format!("{}:{}", db.qualified_column_name(*p), fk))
                .collect();
            let children: Vec<String> = column
                .children
                .iter()
                .map(|(c, fk)| format!("{}:{}", db.qualified_column_name(*c), fk))
                .collect();
            lines.push(format!(
                "  {} {} null={} pk={} parents={:?} children={:?}",
                column.name,
                column.type_name,
                column.nullable,
                table.is_primary_column(column.id),
                parents,
                children
            ));
        }
    }
    for fk in db.constraints() {
        lines.push(db.constraint_label(fk.id));
    }
    lines
}

#[test]
fn test_builds_tables_and_views() {
    let db = build(&shop_catalog(), &AnalysisConfig::default()).unwrap();

    assert_eq!(db.table_count(), 3);
    assert_eq!(db.view_count(), 1);
    assert!(db.get_view("big_orders").is_some());
    assert!(db.get_table("big_orders").is_none());
    assert_eq!(db.get_table("ORDERS").unwrap().schema.as_deref(), Some("shop"));
    assert_eq!(db.real_constraints().count(), 2);
}

#[test]
fn test_primary_key_matches_exactly_one_index() {
    let db = build(&shop_catalog(), &AnalysisConfig::default()).unwrap();

    for table in db.tables() {
        for &col in &table.primary_key {
            assert!(table.is_primary_column(col));
        }
        let pk_indexes: Vec<_> = table.indexes.iter().filter(|i| i.is_primary_key).collect();
        assert_eq!(pk_indexes.len(), 1, "table {}", table.name);
        assert!(pk_indexes[0].column_ids().eq(table.primary_key.iter().copied()));
    }

    // Matched by columns rather than synthesized
    let customers = db.get_table("customers").unwrap();
    assert_eq!(customers.primary_key_index().unwrap().name, "customers_pk");
    assert_eq!(customers.indexes.len(), 2);
    assert!(customers.get_column("email").unwrap().unique);

    let items = db.get_table("order_items").unwrap();
    assert_eq!(items.primary_key_index().unwrap().name, "order_items_pkey");
    assert_eq!(items.primary_key_index().unwrap().columns.len(), 2);
}

#[test]
fn test_foreign_key_edges_are_symmetric() {
    let db = build(&shop_catalog(), &AnalysisConfig::default()).unwrap();

    let mut edges = 0;
    for table in db.all() {
        for column in &table.columns {
            let this = schemascope::model::ColumnRef::new(table.id, column.id);
            for (&parent, fk) in &column.parents {
                assert_eq!(db.column(parent).children.get(&this), Some(fk));
                edges += 1;
            }
            for (&child, fk) in &column.children {
                assert_eq!(db.column(child).parents.get(&this), Some(fk));
            }
        }
    }
    assert_eq!(edges, 2);

    let customers = db.get_table("customers").unwrap();
    assert_eq!(customers.max_children, 1);
    assert_eq!(customers.max_parents, 0);
}

#[test]
fn test_unknown_parent_table_is_skipped() {
    let catalog = shop_catalog().with_table(
        StaticTable::new("reviews")
            .column("id", "int")
            .column("ghost_id", "int")
            .foreign_key("fk_reviews_ghost", &["ghost_id"], "ghosts", &["id"]),
    );
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();

    let reviews = db.get_table("reviews").unwrap();
    assert!(reviews.foreign_keys.is_empty());
    assert!(reviews.get_column("ghost_id").unwrap().parents.is_empty());
    assert_eq!(db.real_constraints().count(), 2);
}

#[test]
fn test_missing_parent_column_leaves_mismatched_constraint() {
    let catalog = shop_catalog().with_table(
        StaticTable::new("shipments")
            .column("order_id", "int")
            .column("customer_id", "int")
            .foreign_key(
                "fk_shipments_order",
                &["order_id", "customer_id"],
                "orders",
                &["id", "no_such_column"],
            ),
    );
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();

    let shipments = db.get_table_id("shipments").unwrap();
    let fk = db.find_foreign_key(shipments, "fk_shipments_order").unwrap();
    let constraint = db.constraint(fk);
    assert_eq!(constraint.child_columns.len(), 2);
    assert_eq!(constraint.parent_columns.len(), 1);
    assert!(constraint.is_mismatched());
    // The resolvable pair is still wired
    assert_eq!(
        db.get_table("shipments")
            .unwrap()
            .get_column("order_id")
            .unwrap()
            .parents
            .len(),
        1
    );
}

#[test]
fn test_foreign_key_outside_schema_is_skipped() {
    let mut catalog = shop_catalog();
    if let Some(orders) = catalog.table_mut("orders") {
        orders.foreign_keys.push(StaticForeignKey {
            name: Some("fk_orders_region".to_string()),
            columns: vec!["placed_at".to_string()],
            references_schema: Some("geo".to_string()),
            references_table: "customers".to_string(),
            references_columns: vec!["id".to_string()],
            ..StaticForeignKey::default()
        });
    }
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();
    assert_eq!(db.real_constraints().count(), 2);
}

#[test]
fn test_referential_actions() {
    let mut catalog = shop_catalog();
    if let Some(items) = catalog.table_mut("order_items") {
        items.foreign_keys[0].on_delete = Some("CASCADE".to_string());
        items.foreign_keys[0].on_update = Some("SET_NULL".to_string());
    }
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();

    let items = db.get_table_id("order_items").unwrap();
    let fk = db.constraint(db.find_foreign_key(items, "fk_items_order").unwrap());
    assert_eq!(fk.delete_rule, ReferentialAction::Cascade);
    assert_eq!(fk.update_rule, ReferentialAction::SetNull);
    assert!(fk.is_cascade_on_delete());
}

#[test]
fn test_row_count_fallbacks() {
    let mut catalog = shop_catalog();
    if let Some(orders) = catalog.table_mut("orders") {
        orders.reject_count_star = true;
    }
    if let Some(items) = catalog.table_mut("order_items") {
        items.row_count = None;
    }
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();

    assert_eq!(db.get_table("customers").unwrap().row_count, 10);
    // count(*) rejected, count(1) answers
    assert_eq!(db.get_table("orders").unwrap().row_count, 25);
    // Both fail
    assert_eq!(db.get_table("order_items").unwrap().row_count, -1);
    // Views are never counted
    assert_eq!(db.get_view("big_orders").unwrap().row_count, 0);
}

#[test]
fn test_row_counts_can_be_disabled() {
    let config = AnalysisConfig {
        row_counts: false,
        ..AnalysisConfig::default()
    };
    let db = build(&shop_catalog(), &config).unwrap();
    assert_eq!(db.get_table("customers").unwrap().row_count, 0);
}

#[test]
fn test_auto_generated_detection() {
    let mut catalog = shop_catalog();
    if let Some(orders) = catalog.table_mut("orders") {
        orders.columns[0].auto_increment = true;
    }
    if let Some(customers) = catalog.table_mut("customers") {
        customers.columns[0].auto_increment = true;
        customers.fail_describe = true;
    }
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();

    assert!(db.get_table("orders").unwrap().get_column("id").unwrap().auto_generated);
    assert!(!db.get_table("customers").unwrap().get_column("id").unwrap().auto_generated);
}

#[test]
fn test_index_failure_is_not_fatal() {
    let mut catalog = shop_catalog();
    if let Some(customers) = catalog.table_mut("customers") {
        customers.fail_indexes = true;
    }
    let db = build(&catalog, &AnalysisConfig::default()).unwrap();

    let customers = db.get_table("customers").unwrap();
    assert_eq!(customers.indexes.len(), 1);
    assert_eq!(customers.primary_key_index().unwrap().name, "customers_pkey");
}

#[test]
fn test_catalog_filtering() {
    let mut system = StaticTable::new("pg_stats").column("x", "int");
    system.table_type = "SYSTEM TABLE".to_string();
    let catalog = shop_catalog()
        .with_table(system)
        .with_table(StaticTable::new("BIN$abc==$0").column("x", "int"))
        .with_table(StaticTable::new("audit_log").column("x", "int"));
    let config = AnalysisConfig {
        exclude_tables: Some("audit_.*".to_string()),
        ..AnalysisConfig::default()
    };
    let db = build(&catalog, &config).unwrap();

    assert_eq!(db.table_count(), 3);
    assert!(db.find("pg_stats").is_none());
    assert!(db.find("BIN$abc==$0").is_none());
    assert!(db.find("audit_log").is_none());
}

#[test]
fn test_views_can_be_skipped() {
    let config = AnalysisConfig {
        views: false,
        ..AnalysisConfig::default()
    };
    let db = build(&shop_catalog(), &config).unwrap();
    assert_eq!(db.view_count(), 0);
}

#[test]
fn test_no_tables_error() {
    let catalog = StaticCatalog::new(Some("empty"));
    let err = build(&catalog, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, BuildError::NoTables { .. }));
}

#[test]
fn test_unreachable_catalog_is_fatal() {
    let mut catalog = shop_catalog();
    catalog.unavailable = true;
    let err = build(&catalog, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, BuildError::Metadata(_)));
}

#[test]
fn test_first_table_failure_is_fatal() {
    let mut catalog = shop_catalog();
    if let Some(customers) = catalog.table_mut("customers") {
        customers.fail_columns = true;
    }
    let config = AnalysisConfig {
        max_threads: 4,
        ..AnalysisConfig::default()
    };
    let err = build(&catalog, &config).unwrap_err();
    assert!(matches!(err, BuildError::Metadata(_)));
}

#[test]
fn test_later_table_failure_is_skipped() {
    let mut catalog = shop_catalog();
    if let Some(items) = catalog.table_mut("order_items") {
        items.fail_columns = true;
    }
    for threads in [1, 4] {
        let config = AnalysisConfig {
            max_threads: threads,
            ..AnalysisConfig::default()
        };
        let db = build(&catalog, &config).unwrap();
        assert_eq!(db.table_count(), 2);
        assert!(db.get_table("order_items").is_none());
    }
}

#[test]
fn test_concurrent_build_matches_sequential() {
    let mut catalog = shop_catalog();
    for i in 0..20 {
        catalog = catalog.with_table(
            StaticTable::new(&format!("extra_{:02}", i))
                .not_null_column("id", "int")
                .column("order_id", "int")
                .primary_key(&["id"])
                .foreign_key(&format!("fk_extra_{}", i), &["order_id"], "orders", &["id"]),
        );
    }

    let sequential = build(&catalog, &AnalysisConfig::default()).unwrap();
    let concurrent = build(
        &catalog,
        &AnalysisConfig {
            max_threads: 4,
            ..AnalysisConfig::default()
        },
    )
    .unwrap();

    assert_eq!(sequential.table_count(), 23);
    assert_eq!(fingerprint(&sequential), fingerprint(&concurrent));
}

#[test]
fn test_rebuild_is_structurally_identical() {
    let catalog = shop_catalog();
    let config = AnalysisConfig::default();
    let first = build(&catalog, &config).unwrap();
    let second = build(&catalog, &config).unwrap();
    assert_eq!(fingerprint(&first), fingerprint(&second));
}

#[test]
fn test_progress_reports_every_table() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let catalog = shop_catalog();
    let config = AnalysisConfig {
        max_threads: 2,
        ..AnalysisConfig::default()
    };
    ModelBuilder::new(&catalog, &config)
        .with_progress(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .build("shop")
        .unwrap();
    assert_eq!(seen.load(Ordering::Relaxed), 4);
}

#[test]
fn test_check_constraints_query() {
    let sql = "select table_name, constraint_name, text from checks where schema = ':schema'";
    let catalog = shop_catalog().with_query(
        "select table_name, constraint_name, text from checks where schema = 'shop'",
        QueryResult {
            columns: vec![
                "table_name".to_string(),
                "constraint_name".to_string(),
                "text".to_string(),
            ],
            rows: vec![vec![
                Some("order_items".to_string()),
                Some("positive_line".to_string()),
                Some("line > 0".to_string()),
            ]],
        },
    );
    let mut config = AnalysisConfig {
        schema: Some("shop".to_string()),
        ..AnalysisConfig::default()
    };
    config.queries.check_constraints = Some(sql.to_string());

    let db = build(&catalog, &config).unwrap();
    let items = db.get_table("order_items").unwrap();
    assert_eq!(
        items.check_constraints.get("positive_line").map(String::as_str),
        Some("line > 0")
    );
}

#[test]
fn test_broken_check_constraint_query_is_fatal() {
    let catalog = shop_catalog().with_failing_query("select broken", "syntax error");
    let mut config = AnalysisConfig::default();
    config.queries.check_constraints = Some("select broken".to_string());

    let err = build(&catalog, &config).unwrap_err();
    assert!(matches!(err, BuildError::CheckConstraints(_)));
}

#[test]
fn test_optional_query_failures_are_not_fatal() {
    let catalog = shop_catalog()
        .with_failing_query("select comments", "no such view")
        .with_query(
            "select ids",
            QueryResult {
                columns: vec!["table_name".to_string(), "table_id".to_string()],
                rows: vec![vec![Some("orders".to_string()), Some("4711".to_string())]],
            },
        );
    let mut config = AnalysisConfig::default();
    config.queries.table_comments = Some("select comments".to_string());
    config.queries.column_comments = Some("select missing".to_string());
    config.queries.table_ids = Some("select ids".to_string());

    let db = build(&catalog, &config).unwrap();
    assert_eq!(db.get_table("orders").unwrap().external_id, Some(4711));
    assert_eq!(db.get_table("customers").unwrap().comments, None);
}

fn rows(columns: &[&str], rows: &[&[&str]]) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .iter()
            .map(|r| r.iter().map(|v| Some(v.to_string())).collect())
            .collect(),
    }
}

#[test]
fn test_view_definitions_are_concatenated() {
    let catalog = shop_catalog()
        .with_table(StaticTable::view("stale_orders").column("id", "int"))
        .with_query(
            "select text from view_text where view_name = 'big_orders'",
            rows(
                &["text"],
                &[&["select id from orders "], &["where placed_at > now()"]],
            ),
        )
        .with_failing_query(
            "select text from view_text where view_name = 'stale_orders'",
            "permission denied",
        );
    let mut config = AnalysisConfig::default();
    config.queries.view_definition =
        Some("select text from view_text where view_name = ':table'".to_string());

    let db = build(&catalog, &config).unwrap();
    assert_eq!(db.view_count(), 2);
    assert_eq!(
        db.get_view("big_orders").unwrap().view_definition(),
        Some("select id from orders where placed_at > now()")
    );
    // A failed lookup leaves the view without text
    let stale = db.get_view("stale_orders").unwrap();
    assert!(stale.is_view());
    assert_eq!(stale.view_definition(), None);
}

#[test]
fn test_view_definition_not_queried_by_default() {
    let db = build(&shop_catalog(), &AnalysisConfig::default()).unwrap();
    assert_eq!(db.get_view("big_orders").unwrap().view_definition(), None);
}

#[test]
fn test_column_comments_and_index_ids() {
    let catalog = shop_catalog()
        .with_query(
            "select column comments",
            rows(
                &["table_name", "column_name", "comments"],
                &[
                    &["orders", "placed_at", "UTC timestamp of checkout"],
                    &["orders", "customer_id", "  "],
                    &["orders", "no_such_column", "ignored"],
                    &["nowhere", "id", "ignored"],
                ],
            ),
        )
        .with_query(
            "select index ids",
            rows(
                &["table_name", "index_name", "index_id"],
                &[
                    &["customers", "customers_email", "99"],
                    &["customers", "customers_pk", "not a number"],
                    &["customers", "missing_index", "7"],
                ],
            ),
        );
    let mut config = AnalysisConfig::default();
    config.queries.column_comments = Some("select column comments".to_string());
    config.queries.index_ids = Some("select index ids".to_string());

    let db = build(&catalog, &config).unwrap();

    let orders = db.get_table("orders").unwrap();
    assert_eq!(
        orders.get_column("placed_at").unwrap().comments.as_deref(),
        Some("UTC timestamp of checkout")
    );
    // Blank comments are dropped
    assert_eq!(orders.get_column("customer_id").unwrap().comments, None);

    let customers = db.get_table("customers").unwrap();
    assert_eq!(customers.get_index("customers_email").unwrap().external_id, Some(99));
    assert_eq!(customers.get_index("customers_pk").unwrap().external_id, None);
}

#[test]
fn test_disabled_implied_columns() {
    let mut config = AnalysisConfig::default();
    config.implied.disabled_columns = vec!["orders\\.placed_at".to_string()];
    let db = build(&shop_catalog(), &config).unwrap();

    let orders = db.get_table("orders").unwrap();
    let placed_at = orders.get_column("placed_at").unwrap();
    assert!(!placed_at.allow_implied_parents);
    assert!(!placed_at.allow_implied_children);
    assert!(orders.get_column("customer_id").unwrap().allow_implied_parents);
}
