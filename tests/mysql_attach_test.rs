//! `mysql_attach` view creation against a recording catalog

mod common;

use std::collections::HashSet;

use common::{numbers_table, orders_table, registry, FakeMysql};
use mysql_scanner::config::ScannerConfig;
use mysql_scanner::error::{Error, Result};
use mysql_scanner::function::mysql_attach::{mysql_attach, ViewCatalog};
use mysql_scanner::model::attach_function_data::AttachFunctionData;

/// Catalog that records statements and refuses to create an existing view
/// unless asked to replace it
#[derive(Default)]
struct RecordingCatalog {
    statements: Vec<String>,
    views: HashSet<String>,
}

impl ViewCatalog for RecordingCatalog {
    fn execute(&mut self, sql: &str) -> Result<()> {
        let name = sql
            .split(" AS SELECT")
            .next()
            .and_then(|head| head.rsplit(' ').next())
            .unwrap_or_default()
            .to_string();
        if !sql.starts_with("CREATE OR REPLACE") && self.views.contains(&name) {
            return Err(Error::query(format!("view {} already exists", name)).with_sql(sql));
        }
        self.views.insert(name);
        self.statements.push(sql.to_string());
        Ok(())
    }
}

fn shop() -> std::sync::Arc<FakeMysql> {
    FakeMysql::new()
        .with_table("shop", "orders", orders_table())
        .with_table("shop", "customers", numbers_table(2))
        .with_table("archive", "orders_2019", orders_table())
}

fn attach_data() -> AttachFunctionData {
    AttachFunctionData {
        source_schema: "shop".to_string(),
        ..AttachFunctionData::new("db.internal", "reader", "secret")
    }
}

// ==================== Attach Tests ====================

#[test]
fn test_attach_creates_one_view_per_table() {
    let server = shop();
    let registry = registry(&server, ScannerConfig::default());
    let mut catalog = RecordingCatalog::default();

    let views = mysql_attach(&registry, &attach_data(), &mut catalog).unwrap();

    assert_eq!(views, vec!["customers", "orders"]);
    assert_eq!(
        catalog.statements,
        vec![
            "CREATE VIEW \"main\".\"customers\" AS SELECT * FROM mysql_scan_pushdown('db.internal', 'reader', 'secret', 'shop', 'customers')",
            "CREATE VIEW \"main\".\"orders\" AS SELECT * FROM mysql_scan_pushdown('db.internal', 'reader', 'secret', 'shop', 'orders')",
        ]
    );
}

#[test]
fn test_attach_without_pushdown_uses_plain_scan() {
    let server = shop();
    let registry = registry(&server, ScannerConfig::default());
    let mut catalog = RecordingCatalog::default();
    let data = AttachFunctionData {
        filter_pushdown: false,
        sink_schema: "mirror".to_string(),
        ..attach_data()
    };

    mysql_attach(&registry, &data, &mut catalog).unwrap();

    assert!(catalog
        .statements
        .iter()
        .all(|sql| sql.starts_with("CREATE VIEW \"mirror\".") && sql.contains("FROM mysql_scan('db.internal'")));
}

#[test]
fn test_attach_twice_requires_overwrite() {
    let server = shop();
    let registry = registry(&server, ScannerConfig::default());
    let mut catalog = RecordingCatalog::default();

    mysql_attach(&registry, &attach_data(), &mut catalog).unwrap();
    let err = mysql_attach(&registry, &attach_data(), &mut catalog).unwrap_err();
    assert!(matches!(err, Error::Query { sql: Some(_), .. }));

    let data = AttachFunctionData {
        overwrite: true,
        ..attach_data()
    };
    let views = mysql_attach(&registry, &data, &mut catalog).unwrap();
    assert_eq!(views.len(), 2);
    assert!(catalog.statements[2].starts_with("CREATE OR REPLACE VIEW"));
}

#[test]
fn test_attach_empty_schema_creates_nothing() {
    let server = shop();
    let registry = registry(&server, ScannerConfig::default());
    let mut catalog = RecordingCatalog::default();
    let data = AttachFunctionData {
        source_schema: "staging".to_string(),
        ..attach_data()
    };

    let views = mysql_attach(&registry, &data, &mut catalog).unwrap();

    assert!(views.is_empty());
    assert!(catalog.statements.is_empty());
}

#[test]
fn test_attach_only_reads_the_source_schema() {
    let server = shop();
    let registry = registry(&server, ScannerConfig::default());
    let mut catalog = RecordingCatalog::default();
    let data = AttachFunctionData {
        source_schema: "archive".to_string(),
        ..attach_data()
    };

    let views = mysql_attach(&registry, &data, &mut catalog).unwrap();

    assert_eq!(views, vec!["orders_2019"]);
    assert!(server
        .queries()
        .iter()
        .any(|q| q.ends_with("FROM information_schema.tables WHERE table_schema = 'archive'")));
}

#[test]
fn test_attach_releases_its_connection() {
    let server = shop();
    let registry = registry(&server, ScannerConfig::default());
    let mut catalog = RecordingCatalog::default();

    mysql_attach(&registry, &attach_data(), &mut catalog).unwrap();

    let pool = registry.pool_for("db.internal", "reader", "secret").unwrap();
    assert_eq!(pool.in_use(), 0);
}
