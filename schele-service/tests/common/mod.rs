//! Test helpers for schele-service integration tests.
//!
//! PostgreSQL-backed tests need `TEST_DATABASE_URL` and are `#[ignore]`d by
//! default. Each test app runs in its own schema.

#![allow(dead_code)]

pub mod memory;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use schele_service::config::{BillingConfig, DatabaseConfig, ScheleConfig, SupplierConfig};
use schele_service::models::{
    Client, CreateClient, CreateComponent, CreatePricing, CreateProject, CreateWorkReport,
    CreateWorkReportItem, Project, ProjectComponentPricing, ScaffoldComponent, UnitOfMeasure,
    WorkReportWithItems, WorkType,
};
use schele_service::services::{init_metrics, Database};
use schele_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,schele_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn get_test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run database tests")
}

fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_schele_{}_{}", std::process::id(), counter)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Running application bound to a random port, plus a direct store handle.
pub struct TestApp {
    pub http_address: String,
    pub db: Database,
    schema_name: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_tracing();
        init_metrics();

        let base_url = get_test_database_url();
        let schema_name = unique_schema_name();

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");
        pool.close().await;

        let separator = if base_url.contains('?') { "&" } else { "?" };
        let url = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let config = ScheleConfig {
            common: CoreConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            service_name: "schele-service-test".to_string(),
            service_version: "test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: url.clone(),
                max_connections: 5,
                min_connections: 1,
            },
            billing: BillingConfig {
                currency: "EUR".to_string(),
                supplier: SupplierConfig {
                    name: "Schele Test SRL".to_string(),
                    tax_id: Some("RO555".to_string()),
                    ..SupplierConfig::default()
                },
            },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let db = app.db().clone();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let http_address = format!("http://127.0.0.1:{}", port);
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", http_address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            db,
            schema_name,
        }
    }

    pub async fn cleanup(&self) {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&get_test_database_url())
            .await
            .ok();

        if let Some(pool) = pool {
            let _ = sqlx::query(&format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                self.schema_name
            ))
            .execute(&pool)
            .await;
            pool.close().await;
        }
    }

    pub async fn client(&self, name: &str) -> Client {
        self.db
            .create_client(&CreateClient {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .expect("Failed to create client")
    }

    pub async fn project(&self, client: &Client, name: &str) -> Project {
        self.db
            .create_project(&CreateProject {
                client_id: client.client_id,
                name: name.to_string(),
                code: None,
                location: None,
                description: None,
            })
            .await
            .expect("Failed to create project")
    }

    pub async fn component(&self, name: &str) -> ScaffoldComponent {
        self.db
            .create_component(&CreateComponent {
                name: name.to_string(),
                code: None,
                component_type: None,
                total_stock: Decimal::new(100, 0),
                available_stock: Decimal::new(100, 0),
                current_project_id: None,
                location: None,
                notes: None,
            })
            .await
            .expect("Failed to create component")
    }

    pub async fn pricing(
        &self,
        project: &Project,
        component: &ScaffoldComponent,
        price: Decimal,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> ProjectComponentPricing {
        self.db
            .create_pricing(&CreatePricing {
                project_id: project.project_id,
                scaffold_component_id: component.scaffold_component_id,
                price,
                unit_of_measure: UnitOfMeasure::Piece,
                valid_from: from,
                valid_to: to,
                notes: None,
            })
            .await
            .expect("Failed to create pricing")
    }

    pub async fn draft(
        &self,
        number: &str,
        project: &Project,
        report_date: NaiveDate,
    ) -> WorkReportWithItems {
        self.db
            .create_work_report(&CreateWorkReport {
                number: number.to_string(),
                client_id: project.client_id,
                project_id: project.project_id,
                work_type: WorkType::Installation,
                report_date,
                location: None,
                notes: None,
            })
            .await
            .expect("Failed to create work report")
    }

    /// Draft report with one priced line of `quantity` pieces.
    pub async fn draft_with_line(
        &self,
        number: &str,
        project: &Project,
        component: &ScaffoldComponent,
        report_date: NaiveDate,
        quantity: Decimal,
    ) -> WorkReportWithItems {
        let report = self.draft(number, project, report_date).await;
        self.db
            .add_item(report.report.work_report_id, &line(component, quantity))
            .await
            .expect("Failed to add work report item");
        self.db
            .get_work_report(report.report.work_report_id)
            .await
            .expect("Failed to reload work report")
            .expect("Work report disappeared")
    }
}

pub fn line(component: &ScaffoldComponent, quantity: Decimal) -> CreateWorkReportItem {
    CreateWorkReportItem {
        scaffold_component_id: component.scaffold_component_id,
        quantity,
        length: None,
        weight: None,
        unit_of_measure: UnitOfMeasure::Piece,
        notes: None,
    }
}
