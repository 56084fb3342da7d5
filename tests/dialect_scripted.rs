//! Record store behavior against scripted MySQL, SQL Server and PostgreSQL connections
//!
//! The scripted connection answers metadata queries with canned rows and
//! records every statement it receives along with its bound values, so the
//! exact SQL per dialect can be checked without a server.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_record_access::core::{Connector, Database};
use rust_record_access::prelude::*;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;
type Bound = Arc<Mutex<Vec<Vec<DatabaseValue>>>>;

struct ScriptedDatabase {
    engine: DatabaseType,
    metadata: Vec<DatabaseRow>,
    log: Log,
    bound: Bound,
}

impl ScriptedDatabase {
    fn affected(&self, query: &str) -> Result<u64> {
        self.log.lock().push(query.to_string());
        if query.contains("broken") {
            return Err(DatabaseError::execution("syntax error near 'broken'"));
        }
        Ok(1)
    }

    fn rows(&self, query: &str) -> DatabaseResult {
        self.log.lock().push(query.to_string());
        if query.starts_with("SHOW COLUMNS") || query.contains("INFORMATION_SCHEMA.COLUMNS") {
            return self.metadata.clone();
        }
        if query.contains("SCOPE_IDENTITY()") {
            let mut row = DatabaseRow::new();
            row.insert("AddedIdentity".into(), DatabaseValue::Long(41));
            row.insert("AffectedRows".into(), DatabaseValue::Long(1));
            return vec![row];
        }
        Vec::new()
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    fn database_type(&self) -> DatabaseType {
        self.engine
    }

    async fn connect(&self, _connection_string: &str) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        self.affected(query)
    }

    async fn query(&self, query: &str) -> Result<DatabaseResult> {
        Ok(self.rows(query))
    }

    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        self.bound.lock().push(params.to_vec());
        Ok(self.rows(query))
    }

    async fn execute_with_params(&self, query: &str, params: &[DatabaseValue]) -> Result<u64> {
        self.bound.lock().push(params.to_vec());
        self.affected(query)
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        Ok(Some(41))
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.log.lock().push("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.log.lock().push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.log.lock().push("ROLLBACK".to_string());
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        false
    }
}

struct ScriptedConnector {
    engine: DatabaseType,
    metadata: Vec<DatabaseRow>,
    log: Log,
    bound: Bound,
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn database_type(&self) -> DatabaseType {
        self.engine
    }

    async fn connect(&self) -> Result<Box<dyn Database>> {
        Ok(Box::new(ScriptedDatabase {
            engine: self.engine,
            metadata: self.metadata.clone(),
            log: Arc::clone(&self.log),
            bound: Arc::clone(&self.bound),
        }))
    }
}

fn row(pairs: &[(&str, DatabaseValue)]) -> DatabaseRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn text(value: &str) -> DatabaseValue {
    DatabaseValue::from(value)
}

fn mysql_listing_columns() -> Vec<DatabaseRow> {
    let show = |field: &str, ty: &str, null: &str, key: &str, default: DatabaseValue, extra: &str| {
        row(&[
            ("Field", text(field)),
            ("Type", text(ty)),
            ("Null", text(null)),
            ("Key", text(key)),
            ("Default", default),
            ("Extra", text(extra)),
        ])
    };
    vec![
        show("ListingID", "int(11)", "NO", "PRI", DatabaseValue::Null, "auto_increment"),
        show("Title", "varchar(100)", "NO", "", DatabaseValue::Null, ""),
        show("Price", "float", "YES", "", DatabaseValue::Null, ""),
        show("ListedOn", "date", "YES", "", DatabaseValue::Null, ""),
        show("Status", "varchar(20)", "NO", "", text("active"), ""),
    ]
}

fn mssql_listing_columns() -> Vec<DatabaseRow> {
    let column = |name: &str, ty: &str, nullable: &str, default: DatabaseValue, identity: i32, pk: i32| {
        row(&[
            ("COLUMN_NAME", text(name)),
            ("DATA_TYPE", text(ty)),
            ("IS_NULLABLE", text(nullable)),
            ("COLUMN_DEFAULT", default),
            ("IDENTITY_COLUMN", DatabaseValue::Int(identity)),
            ("PRIMARY_KEY", DatabaseValue::Int(pk)),
        ])
    };
    vec![
        column("ListingID", "int", "NO", DatabaseValue::Null, 1, 1),
        column("Title", "nvarchar", "NO", DatabaseValue::Null, 0, 0),
        column("Price", "float", "YES", DatabaseValue::Null, 0, 0),
        column("ListedOn", "date", "YES", DatabaseValue::Null, 0, 0),
        column("Status", "nvarchar", "NO", text("('active')"), 0, 0),
    ]
}

struct Scripted {
    store: RecordStore,
    log: Log,
    bound: Bound,
}

fn scripted_store(engine: DatabaseType, metadata: Vec<DatabaseRow>, escape: bool) -> Scripted {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let bound: Bound = Arc::new(Mutex::new(Vec::new()));
    let connector = ScriptedConnector {
        engine,
        metadata,
        log: Arc::clone(&log),
        bound: Arc::clone(&bound),
    };
    let config = DatabaseConfig::new(engine)
        .host("db.internal")
        .database("listings")
        .escape(escape);
    let store = RecordStore::with_connector(config, Arc::new(connector)).expect("store");
    Scripted { store, log, bound }
}

fn payload(pairs: &[(&str, &str)]) -> RecordPayload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), DatabaseValue::from(*v)))
        .collect()
}

#[tokio::test]
async fn test_mysql_insert_is_qualified_and_reports_insert_id() {
    let Scripted { store, log, bound } = scripted_store(DatabaseType::Mysql, mysql_listing_columns(), true);

    let added = store
        .add_record(
            "Listings",
            &payload(&[("Title", "O'Brien's Barn"), ("Price", "12.5"), ("ListedOn", "1/2/2021")]),
            false,
        )
        .await;

    assert!(added.is_success(), "{:?}", added.errors);
    assert_eq!(
        added.query,
        "INSERT INTO `Listings` (`Listings`.`Title`, `Listings`.`Price`, `Listings`.`ListedOn`, `Listings`.`Status`) \
         VALUES ('O\\'Brien\\'s Barn', 12.5, '2021-01-02', 'active')"
    );
    assert_eq!(added.result, QueryResult::Identity(DatabaseValue::Long(41)));
    assert_eq!(
        *log.lock(),
        vec![
            "SHOW COLUMNS FROM `Listings`",
            "INSERT INTO `Listings` (`Listings`.`Title`, `Listings`.`Price`, `Listings`.`ListedOn`, `Listings`.`Status`) \
             VALUES (?, ?, ?, ?)",
        ]
    );
    assert_eq!(
        *bound.lock(),
        vec![vec![
            DatabaseValue::from("O'Brien's Barn"),
            DatabaseValue::Double(12.5),
            DatabaseValue::from("2021-01-02"),
            DatabaseValue::from("active"),
        ]]
    );
}

#[tokio::test]
async fn test_mysql_update_and_delete_shapes() {
    let Scripted { store, log, bound } = scripted_store(DatabaseType::Mysql, mysql_listing_columns(), false);

    let edited = store
        .edit_record("Listings", 7, &payload(&[("Price", ""), ("Title", "Loft")]), &QueryOptions::new())
        .await;
    assert_eq!(
        edited.query,
        "UPDATE `Listings` SET `Listings`.`Title` = 'Loft', `Listings`.`Price` = NULL WHERE `Listings`.`ListingID` = 7"
    );
    assert_eq!(edited.result.count(), Some(1));

    let deleted = store
        .delete_record("Listings", 7, &QueryOptions::new())
        .await;
    assert_eq!(deleted.query, "DELETE FROM `Listings` WHERE `Listings`.`ListingID` = 7");

    let found = store
        .get_specific(
            "Listings",
            7,
            &QueryOptions::new().order_by("Title", OrderDirection::Asc),
        )
        .await;
    assert_eq!(
        found.query,
        "SELECT * FROM `Listings` WHERE `ListingID` = 7 ORDER BY `Title` ASC"
    );
    assert_eq!(found.rows().map(Vec::len), Some(0));

    let sent: Vec<String> = log
        .lock()
        .iter()
        .filter(|sql| !sql.starts_with("SHOW COLUMNS"))
        .cloned()
        .collect();
    assert_eq!(
        sent,
        vec![
            "UPDATE `Listings` SET `Listings`.`Title` = ?, `Listings`.`Price` = NULL WHERE `Listings`.`ListingID` = ?",
            "DELETE FROM `Listings` WHERE `Listings`.`ListingID` = ?",
            "SELECT * FROM `Listings` WHERE `ListingID` = ? ORDER BY `Title` ASC",
        ]
    );
    assert_eq!(
        *bound.lock(),
        vec![
            vec![DatabaseValue::from("Loft"), DatabaseValue::Long(7)],
            vec![DatabaseValue::Long(7)],
            vec![DatabaseValue::Long(7)],
        ]
    );
    assert_eq!(log.lock().len(), 6);
}

#[tokio::test]
async fn test_mysql_bit_flags_bind_as_integers() {
    let mut columns = mysql_listing_columns();
    columns.push(row(&[
        ("Field", text("Featured")),
        ("Type", text("bit(1)")),
        ("Null", text("YES")),
        ("Key", text("")),
        ("Default", DatabaseValue::Null),
        ("Extra", text("")),
    ]));
    let Scripted { store, log, bound } = scripted_store(DatabaseType::Mysql, columns, false);

    let mut data = payload(&[("Title", "Loft")]);
    data.insert("Featured".into(), DatabaseValue::Bool(true));
    let added = store.add_record("Listings", &data, false).await;

    assert!(added.is_success(), "{:?}", added.errors);
    assert_eq!(
        log.lock().last().cloned().unwrap_or_default(),
        "INSERT INTO `Listings` (`Listings`.`Title`, `Listings`.`Price`, `Listings`.`ListedOn`, `Listings`.`Status`, `Listings`.`Featured`) \
         VALUES (?, NULL, NULL, ?, ?)"
    );

    let edited = store
        .edit_record("Listings", 7, &payload(&[("Featured", "0")]), &QueryOptions::new())
        .await;
    assert!(edited.is_success(), "{:?}", edited.errors);
    assert_eq!(
        edited.query,
        "UPDATE `Listings` SET `Listings`.`Featured` = 0 WHERE `Listings`.`ListingID` = 7"
    );

    assert_eq!(
        *bound.lock(),
        vec![
            vec![text("Loft"), text("active"), DatabaseValue::Long(1)],
            vec![DatabaseValue::Long(0), DatabaseValue::Long(7)],
        ]
    );
}

#[tokio::test]
async fn test_key_and_field_errors_are_reported_together() {
    let Scripted { store, log, .. } = scripted_store(DatabaseType::Mysql, mysql_listing_columns(), false);

    let edited = store
        .edit_record(
            "Listings",
            "seven",
            &payload(&[("Price", "cheap")]),
            &QueryOptions::new(),
        )
        .await;

    assert_eq!(edited.status, Status::Error);
    assert_eq!(
        edited.errors,
        vec![
            "You have entered an improper value, seven, for field ListingID, which is of type int.",
            "You have entered an improper value, cheap, for field Price, which is of type float.",
        ]
    );
    assert_eq!(*log.lock(), vec!["SHOW COLUMNS FROM `Listings`".to_string()]);
}

#[tokio::test]
async fn test_invalid_delete_key_never_issues_delete() {
    let Scripted { store, log, bound } = scripted_store(DatabaseType::Mysql, mysql_listing_columns(), false);

    let deleted = store
        .delete_record("Listings", "1 OR 1=1", &QueryOptions::new())
        .await;

    assert_eq!(deleted.status, Status::Error);
    assert!(log.lock().iter().all(|sql| !sql.starts_with("DELETE")));
    assert!(bound.lock().is_empty());
}

#[tokio::test]
async fn test_sql_server_identity_comes_from_trailing_select() {
    let Scripted { store, log, bound } = scripted_store(DatabaseType::SqlServer, mssql_listing_columns(), true);

    let added = store
        .add_record("Listings", &payload(&[("Title", "Loft"), ("ListedOn", "2021-03-04")]), false)
        .await;

    assert!(added.is_success(), "{:?}", added.errors);
    assert_eq!(
        added.query,
        "INSERT INTO [Listings] ([Listings].[Title], [Listings].[Price], [Listings].[ListedOn], [Listings].[Status]) \
         VALUES ('Loft', NULL, '2021-03-04', 'active')"
    );
    assert_eq!(added.result, QueryResult::Identity(DatabaseValue::Long(41)));

    let sent = log.lock().last().cloned().unwrap_or_default();
    assert_eq!(
        sent,
        "INSERT INTO [Listings] ([Listings].[Title], [Listings].[Price], [Listings].[ListedOn], [Listings].[Status]) \
         VALUES (@P1, NULL, @P2, @P3); SELECT SCOPE_IDENTITY() AS AddedIdentity, @@ROWCOUNT AS AffectedRows"
    );
    assert_eq!(
        *bound.lock(),
        vec![vec![
            DatabaseValue::from("Loft"),
            DatabaseValue::from("2021-03-04"),
            DatabaseValue::from("active"),
        ]]
    );
}

#[tokio::test]
async fn test_sql_server_composite_key_and_get_all() {
    let Scripted { store, bound, .. } = scripted_store(DatabaseType::SqlServer, mssql_listing_columns(), false);

    let found = store
        .get_specific(
            "Listings",
            KeyValue::composite([("ListingID", "3"), ("Ignored", "x")]),
            &QueryOptions::new().fields(&["Title"]),
        )
        .await;
    assert_eq!(found.query, "SELECT [Title] FROM [Listings] WHERE [ListingID] = 3");
    assert_eq!(*bound.lock(), vec![vec![DatabaseValue::Long(3)]]);

    let listed = store
        .get_all(
            "Listings",
            &QueryOptions::new().where_clause("[Status] = 'active'").query_only(true),
        )
        .await;
    assert_eq!(listed.status, Status::QueryOnly);
    assert_eq!(listed.query, "SELECT * FROM [Listings] WHERE [Status] = 'active'");
}

#[tokio::test]
async fn test_transaction_rollback_lists_failed_statements() {
    let Scripted { store, log, bound } = scripted_store(DatabaseType::SqlServer, mssql_listing_columns(), false);

    let batch = store
        .transaction(
            [
                "UPDATE Listings SET Price = 1",
                "UPDATE broken SET",
                "DELETE FROM Listings WHERE ListingID = 2",
            ],
            false,
        )
        .await;

    assert!(!batch.is_success());
    assert_eq!(batch.errors, vec!["UPDATE broken SET"]);
    assert_eq!(
        *log.lock(),
        vec![
            "BEGIN",
            "UPDATE Listings SET Price = 1",
            "UPDATE broken SET",
            "DELETE FROM Listings WHERE ListingID = 2",
            "ROLLBACK",
        ]
    );
    assert!(bound.lock().is_empty());
}

#[tokio::test]
async fn test_postgres_batch_fences_each_statement_with_a_savepoint() {
    let Scripted { store, log, .. } = scripted_store(DatabaseType::Postgres, Vec::new(), false);

    let batch = store
        .transaction(
            [
                "UPDATE listings SET price = 1",
                "UPDATE broken SET",
                "DELETE FROM listings WHERE id = 2",
            ],
            false,
        )
        .await;

    assert!(!batch.is_success());
    assert_eq!(batch.errors, vec!["UPDATE broken SET"]);
    assert!(batch.results.is_empty());
    assert_eq!(
        *log.lock(),
        vec![
            "BEGIN",
            "SAVEPOINT batch_stmt_1",
            "UPDATE listings SET price = 1",
            "RELEASE SAVEPOINT batch_stmt_1",
            "SAVEPOINT batch_stmt_2",
            "UPDATE broken SET",
            "ROLLBACK TO SAVEPOINT batch_stmt_2",
            "SAVEPOINT batch_stmt_3",
            "DELETE FROM listings WHERE id = 2",
            "RELEASE SAVEPOINT batch_stmt_3",
            "ROLLBACK",
        ]
    );

    log.lock().clear();
    let batch = store
        .transaction(vec!["UPDATE listings SET price = 2"], false)
        .await;
    assert!(batch.is_success(), "{:?}", batch.errors);
    assert_eq!(batch.results, vec![QueryResult::Count(1)]);
    assert_eq!(
        *log.lock(),
        vec![
            "BEGIN",
            "SAVEPOINT batch_stmt_1",
            "UPDATE listings SET price = 2",
            "RELEASE SAVEPOINT batch_stmt_1",
            "COMMIT",
        ]
    );
}
