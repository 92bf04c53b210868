//! Database service for schele-service.

use super::metrics::{
    record_error, record_unpriced, DB_QUERY_DURATION, PROFORMAS_TOTAL, WORK_REPORTS_TOTAL,
};
use super::sql::{
    active, attach_items, is_unique_violation, items_for_reports, CLIENT_COLUMNS,
    COMPONENT_COLUMNS, CONTRACT_COLUMNS, PRICING_COLUMNS, PROFORMA_COLUMNS, PROFORMA_ITEM_COLUMNS,
    PROJECT_COLUMNS, WORK_REPORT_COLUMNS,
};
use super::unit_of_work::PgUnitOfWork;
use crate::billing::{
    self, ensure_window, find_overlap, lifecycle, pricing_keys, value_reports, ContractDocument,
    Edit, PriceBook, PricingKey, ProformaDocument, Valuation, ValuationDate, WorkReportDocument,
};
use crate::config::BillingConfig;
use crate::models::{
    Client, Contract, CreateClient, CreateComponent, CreateContract, CreatePricing,
    CreateProforma, CreateProject, CreateWorkReport, CreateWorkReportItem, DashboardSummary,
    ListPricingsFilter, ListWorkReportsFilter, ProformaDetails, ProformaInvoice,
    ProformaInvoiceItem, ProformaItemDetails, Project, ProjectComponentPricing, ScaffoldComponent,
    StockLevels, UpdateClient, UpdateComponent, UpdateContract, UpdatePricing, UpdateProject,
    UpdateWorkReport, WorkReport, WorkReportItem, WorkReportStatus, WorkReportWithItems,
};
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgExecutor;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    billing: BillingConfig,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "schele-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            billing: BillingConfig::default(),
        }
    }

    /// Use these billing settings for documents and contract defaults.
    pub fn with_billing(mut self, billing: BillingConfig) -> Self {
        self.billing = billing;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    async fn commit(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Result<(), AppError> {
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    /// Create a new client.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (client_id, name, code, tax_id, address, phone, email, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.tax_id)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!(
                    "Client with code '{}' already exists",
                    input.code.as_deref().unwrap_or_default()
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e))
            }
        })?;

        timer.observe_duration();

        info!(client_id = %client.client_id, "Client created");

        Ok(client)
    }

    /// Get a live client by ID.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            "{} AND client_id = $1",
            active(CLIENT_COLUMNS, "clients")
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// List live clients by name.
    #[instrument(skip(self))]
    pub async fn list_clients(&self) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(&format!(
            "{} ORDER BY name, client_id",
            active(CLIENT_COLUMNS, "clients")
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    /// Update a live client. Unset fields are left unchanged.
    #[instrument(skip(self, input), fields(client_id = %client_id))]
    pub async fn update_client(
        &self,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Client, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients
            SET name = COALESCE($2, name),
                code = COALESCE($3, code),
                tax_id = COALESCE($4, tax_id),
                address = COALESCE($5, address),
                phone = COALESCE($6, phone),
                email = COALESCE($7, email),
                notes = COALESCE($8, notes),
                updated_utc = NOW()
            WHERE client_id = $1 AND deleted_utc IS NULL
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.tax_id)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(
                    format!(
                        "Client with code '{}' already exists",
                        input.code.as_deref().unwrap_or_default()
                    ),
                    vec![client_id],
                )
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update client: {}", e))
            }
        })?
        .ok_or_else(|| AppError::not_found(format!("Client {} not found", client_id), client_id))?;

        timer.observe_duration();

        info!(client_id = %client_id, "Client updated");

        Ok(client)
    }

    /// Soft-delete a client.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn delete_client(&self, client_id: Uuid) -> Result<(), AppError> {
        self.soft_delete("clients", "client_id", client_id, "Client")
            .await?;
        info!(client_id = %client_id, "Client deleted");
        Ok(())
    }

    async fn soft_delete(
        &self,
        table: &str,
        id_column: &str,
        id: Uuid,
        entity: &str,
    ) -> Result<(), AppError> {
        let operation = format!("delete_{}", table);
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation.as_str()])
            .start_timer();

        let result = sqlx::query(&format!(
            "UPDATE {} SET deleted_utc = NOW() WHERE {} = $1 AND deleted_utc IS NULL",
            table, id_column
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete {}: {}", entity, e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(
                format!("{} {} not found", entity, id),
                id,
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Contract Operations
    // -------------------------------------------------------------------------

    /// Create a rental contract for a live client. Unset supplier fields are
    /// filled from the configured supplier.
    #[instrument(skip(self, input), fields(number = %input.number, client_id = %input.client_id))]
    pub async fn create_contract(&self, input: &CreateContract) -> Result<Contract, AppError> {
        input.validate()?;
        ensure_contract_period(input.start_date, input.end_date)?;

        self.get_client(input.client_id).await?.ok_or_else(|| {
            AppError::not_found(
                format!("Client {} not found", input.client_id),
                input.client_id,
            )
        })?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_contract"])
            .start_timer();

        let supplier = &self.billing.supplier;
        let contract = sqlx::query_as::<_, Contract>(&format!(
            r#"
            INSERT INTO contracts (
                contract_id, number, client_id, contract_date, start_date, end_date,
                location, description, terms, supplier_name, supplier_tax_id,
                supplier_address, supplier_phone, supplier_email, supplier_bank_account,
                supplier_bank_name, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.number)
        .bind(input.client_id)
        .bind(input.contract_date.unwrap_or(input.start_date))
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(&input.location)
        .bind(&input.description)
        .bind(&input.terms)
        .bind(input.supplier_name.as_ref().unwrap_or(&supplier.name))
        .bind(input.supplier_tax_id.as_ref().or(supplier.tax_id.as_ref()))
        .bind(input.supplier_address.as_ref().or(supplier.address.as_ref()))
        .bind(input.supplier_phone.as_ref().or(supplier.phone.as_ref()))
        .bind(input.supplier_email.as_ref().or(supplier.email.as_ref()))
        .bind(
            input
                .supplier_bank_account
                .as_ref()
                .or(supplier.bank_account.as_ref()),
        )
        .bind(input.supplier_bank_name.as_ref().or(supplier.bank_name.as_ref()))
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!(
                    "Contract with number '{}' already exists",
                    input.number
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create contract: {}", e))
            }
        })?;

        timer.observe_duration();

        info!(contract_id = %contract.contract_id, client_id = %contract.client_id, "Contract created");

        Ok(contract)
    }

    /// Get a live contract by ID.
    #[instrument(skip(self), fields(contract_id = %contract_id))]
    pub async fn get_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_contract"])
            .start_timer();

        let contract = sqlx::query_as::<_, Contract>(&format!(
            "{} AND contract_id = $1",
            active(CONTRACT_COLUMNS, "contracts")
        ))
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get contract: {}", e)))?;

        timer.observe_duration();

        Ok(contract)
    }

    /// List live contracts, optionally of one client, newest contract date first.
    #[instrument(skip(self))]
    pub async fn list_contracts(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<Contract>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_contracts"])
            .start_timer();

        let contracts = sqlx::query_as::<_, Contract>(&format!(
            "{} AND ($1::uuid IS NULL OR client_id = $1) ORDER BY contract_date DESC, number",
            active(CONTRACT_COLUMNS, "contracts")
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list contracts: {}", e)))?;

        timer.observe_duration();

        Ok(contracts)
    }

    /// Update a live contract. The resulting period must not end before
    /// it starts.
    #[instrument(skip(self, input), fields(contract_id = %contract_id))]
    pub async fn update_contract(
        &self,
        contract_id: Uuid,
        input: &UpdateContract,
    ) -> Result<Contract, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_contract"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, Contract>(&format!(
            "{} AND contract_id = $1 FOR UPDATE",
            active(CONTRACT_COLUMNS, "contracts")
        ))
        .bind(contract_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get contract: {}", e)))?
        .ok_or_else(|| {
            AppError::not_found(format!("Contract {} not found", contract_id), contract_id)
        })?;

        let start_date = input.start_date.unwrap_or(current.start_date);
        let end_date = input.end_date.unwrap_or(current.end_date);
        ensure_contract_period(start_date, end_date)?;

        let contract = sqlx::query_as::<_, Contract>(&format!(
            r#"
            UPDATE contracts
            SET number = COALESCE($2, number),
                contract_date = COALESCE($3, contract_date),
                start_date = $4,
                end_date = $5,
                location = COALESCE($6, location),
                description = COALESCE($7, description),
                terms = COALESCE($8, terms),
                notes = COALESCE($9, notes),
                updated_utc = NOW()
            WHERE contract_id = $1
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        ))
        .bind(contract_id)
        .bind(&input.number)
        .bind(input.contract_date)
        .bind(start_date)
        .bind(end_date)
        .bind(&input.location)
        .bind(&input.description)
        .bind(&input.terms)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(
                    format!(
                        "Contract with number '{}' already exists",
                        input.number.as_deref().unwrap_or_default()
                    ),
                    vec![contract_id],
                )
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update contract: {}", e))
            }
        })?;

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(contract_id = %contract_id, "Contract updated");

        Ok(contract)
    }

    /// Soft-delete a contract.
    #[instrument(skip(self), fields(contract_id = %contract_id))]
    pub async fn delete_contract(&self, contract_id: Uuid) -> Result<(), AppError> {
        self.soft_delete("contracts", "contract_id", contract_id, "Contract")
            .await?;
        info!(contract_id = %contract_id, "Contract deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Project Operations
    // -------------------------------------------------------------------------

    /// Create a project for a live client.
    #[instrument(skip(self, input), fields(client_id = %input.client_id, name = %input.name))]
    pub async fn create_project(&self, input: &CreateProject) -> Result<Project, AppError> {
        input.validate()?;

        self.get_client(input.client_id).await?.ok_or_else(|| {
            AppError::not_found(
                format!("Client {} not found", input.client_id),
                input.client_id,
            )
        })?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_project"])
            .start_timer();

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (project_id, client_id, name, code, location, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.client_id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.location)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create project: {}", e)))?;

        timer.observe_duration();

        info!(project_id = %project.project_id, client_id = %project.client_id, "Project created");

        Ok(project)
    }

    /// Get a live project by ID.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_project"])
            .start_timer();

        let project = sqlx::query_as::<_, Project>(&format!(
            "{} AND project_id = $1",
            active(PROJECT_COLUMNS, "projects")
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get project: {}", e)))?;

        timer.observe_duration();

        Ok(project)
    }

    /// List live projects, optionally of one client.
    #[instrument(skip(self))]
    pub async fn list_projects(&self, client_id: Option<Uuid>) -> Result<Vec<Project>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_projects"])
            .start_timer();

        let projects = sqlx::query_as::<_, Project>(&format!(
            "{} AND ($1::uuid IS NULL OR client_id = $1) ORDER BY name, project_id",
            active(PROJECT_COLUMNS, "projects")
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list projects: {}", e)))?;

        timer.observe_duration();

        Ok(projects)
    }

    /// Update a live project.
    #[instrument(skip(self, input), fields(project_id = %project_id))]
    pub async fn update_project(
        &self,
        project_id: Uuid,
        input: &UpdateProject,
    ) -> Result<Project, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_project"])
            .start_timer();

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                code = COALESCE($3, code),
                location = COALESCE($4, location),
                description = COALESCE($5, description),
                updated_utc = NOW()
            WHERE project_id = $1 AND deleted_utc IS NULL
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        ))
        .bind(project_id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.location)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update project: {}", e)))?
        .ok_or_else(|| {
            AppError::not_found(format!("Project {} not found", project_id), project_id)
        })?;

        timer.observe_duration();

        info!(project_id = %project_id, "Project updated");

        Ok(project)
    }

    /// Soft-delete a project.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn delete_project(&self, project_id: Uuid) -> Result<(), AppError> {
        self.soft_delete("projects", "project_id", project_id, "Project")
            .await?;
        info!(project_id = %project_id, "Project deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Scaffold Component Operations
    // -------------------------------------------------------------------------

    /// Create an inventory component. Available stock is capped at the total.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_component(
        &self,
        input: &CreateComponent,
    ) -> Result<ScaffoldComponent, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_component"])
            .start_timer();

        let stock = StockLevels::new(input.total_stock, input.available_stock);

        let component = sqlx::query_as::<_, ScaffoldComponent>(&format!(
            r#"
            INSERT INTO scaffold_components
                (scaffold_component_id, name, code, component_type, total_stock, available_stock, current_project_id, location, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            COMPONENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.component_type)
        .bind(stock.total)
        .bind(stock.available)
        .bind(input.current_project_id)
        .bind(&input.location)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create component: {}", e))
        })?;

        timer.observe_duration();

        info!(
            scaffold_component_id = %component.scaffold_component_id,
            total_stock = %component.total_stock,
            available_stock = %component.available_stock,
            "Component created"
        );

        Ok(component)
    }

    /// Get a live component by ID.
    #[instrument(skip(self), fields(scaffold_component_id = %scaffold_component_id))]
    pub async fn get_component(
        &self,
        scaffold_component_id: Uuid,
    ) -> Result<Option<ScaffoldComponent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_component"])
            .start_timer();

        let component = sqlx::query_as::<_, ScaffoldComponent>(&format!(
            "{} AND scaffold_component_id = $1",
            active(COMPONENT_COLUMNS, "scaffold_components")
        ))
        .bind(scaffold_component_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get component: {}", e)))?;

        timer.observe_duration();

        Ok(component)
    }

    /// List live components by name.
    #[instrument(skip(self))]
    pub async fn list_components(&self) -> Result<Vec<ScaffoldComponent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_components"])
            .start_timer();

        let components = sqlx::query_as::<_, ScaffoldComponent>(&format!(
            "{} ORDER BY name, scaffold_component_id",
            active(COMPONENT_COLUMNS, "scaffold_components")
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list components: {}", e))
        })?;

        timer.observe_duration();

        Ok(components)
    }

    /// Update a component. Lowering the total below the available stock
    /// lowers the available stock with it.
    #[instrument(skip(self, input), fields(scaffold_component_id = %scaffold_component_id))]
    pub async fn update_component(
        &self,
        scaffold_component_id: Uuid,
        input: &UpdateComponent,
    ) -> Result<ScaffoldComponent, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_component"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = lock_component(&mut *tx, scaffold_component_id).await?;
        let stock = current
            .stock()
            .apply(input.total_stock, input.available_stock);

        let component = sqlx::query_as::<_, ScaffoldComponent>(&format!(
            r#"
            UPDATE scaffold_components
            SET name = COALESCE($2, name),
                code = COALESCE($3, code),
                component_type = COALESCE($4, component_type),
                total_stock = $5,
                available_stock = $6,
                current_project_id = COALESCE($7, current_project_id),
                location = COALESCE($8, location),
                notes = COALESCE($9, notes),
                updated_utc = NOW()
            WHERE scaffold_component_id = $1
            RETURNING {}
            "#,
            COMPONENT_COLUMNS
        ))
        .bind(scaffold_component_id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.component_type)
        .bind(stock.total)
        .bind(stock.available)
        .bind(input.current_project_id)
        .bind(&input.location)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update component: {}", e))
        })?;

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(
            scaffold_component_id = %scaffold_component_id,
            total_stock = %component.total_stock,
            available_stock = %component.available_stock,
            "Component updated"
        );

        Ok(component)
    }

    /// Soft-delete a component.
    #[instrument(skip(self), fields(scaffold_component_id = %scaffold_component_id))]
    pub async fn delete_component(&self, scaffold_component_id: Uuid) -> Result<(), AppError> {
        self.soft_delete(
            "scaffold_components",
            "scaffold_component_id",
            scaffold_component_id,
            "Component",
        )
        .await?;
        info!(scaffold_component_id = %scaffold_component_id, "Component deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pricing Operations
    // -------------------------------------------------------------------------

    /// Create a pricing record.
    ///
    /// The overlap check and the insert run in one transaction holding the
    /// component row lock, so two concurrent creations for the same pair
    /// cannot both pass the check.
    #[instrument(
        skip(self, input),
        fields(project_id = %input.project_id, scaffold_component_id = %input.scaffold_component_id)
    )]
    pub async fn create_pricing(
        &self,
        input: &CreatePricing,
    ) -> Result<ProjectComponentPricing, AppError> {
        input.validate()?;
        ensure_window(input.valid_from, input.valid_to)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_pricing"])
            .start_timer();

        let mut tx = self.begin().await?;

        fetch_project(&mut *tx, input.project_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    format!("Project {} not found", input.project_id),
                    input.project_id,
                )
            })?;
        lock_component(&mut *tx, input.scaffold_component_id).await?;

        let existing =
            pair_pricings(&mut *tx, input.project_id, input.scaffold_component_id).await?;
        if let Some(other) = find_overlap(&existing, input.valid_from, input.valid_to, None) {
            return Err(overlap_conflict(other));
        }

        let pricing = sqlx::query_as::<_, ProjectComponentPricing>(&format!(
            r#"
            INSERT INTO project_component_pricings
                (pricing_id, project_id, scaffold_component_id, price, unit_of_measure, valid_from, valid_to, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            PRICING_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.project_id)
        .bind(input.scaffold_component_id)
        .bind(input.price)
        .bind(input.unit_of_measure.as_str())
        .bind(input.valid_from)
        .bind(input.valid_to)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create pricing: {}", e)))?;

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(
            pricing_id = %pricing.pricing_id,
            price = %pricing.price,
            valid_from = %pricing.valid_from,
            "Pricing created"
        );

        Ok(pricing)
    }

    /// Get a live pricing record by ID.
    #[instrument(skip(self), fields(pricing_id = %pricing_id))]
    pub async fn get_pricing(
        &self,
        pricing_id: Uuid,
    ) -> Result<Option<ProjectComponentPricing>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_pricing"])
            .start_timer();

        let pricing = sqlx::query_as::<_, ProjectComponentPricing>(&format!(
            "{} AND pricing_id = $1",
            active(PRICING_COLUMNS, "project_component_pricings")
        ))
        .bind(pricing_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get pricing: {}", e)))?;

        timer.observe_duration();

        Ok(pricing)
    }

    /// List live pricing records, newest window first.
    #[instrument(skip(self))]
    pub async fn list_pricings(
        &self,
        filter: &ListPricingsFilter,
    ) -> Result<Vec<ProjectComponentPricing>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_pricings"])
            .start_timer();

        let pricings = sqlx::query_as::<_, ProjectComponentPricing>(&format!(
            r#"
            {}
              AND ($1::uuid IS NULL OR project_id = $1)
              AND ($2::uuid IS NULL OR scaffold_component_id = $2)
            ORDER BY valid_from DESC, created_utc DESC
            "#,
            active(PRICING_COLUMNS, "project_component_pricings")
        ))
        .bind(filter.project_id)
        .bind(filter.scaffold_component_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list pricings: {}", e)))?;

        timer.observe_duration();

        Ok(pricings)
    }

    /// Update a pricing record under the same overlap rule as creation,
    /// ignoring the record itself.
    #[instrument(skip(self, input), fields(pricing_id = %pricing_id))]
    pub async fn update_pricing(
        &self,
        pricing_id: Uuid,
        input: &UpdatePricing,
    ) -> Result<ProjectComponentPricing, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_pricing"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, ProjectComponentPricing>(&format!(
            "{} AND pricing_id = $1",
            active(PRICING_COLUMNS, "project_component_pricings")
        ))
        .bind(pricing_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get pricing: {}", e)))?
        .ok_or_else(|| {
            AppError::not_found(format!("Pricing {} not found", pricing_id), pricing_id)
        })?;

        lock_component(&mut *tx, current.scaffold_component_id).await?;

        let valid_from = input.valid_from.unwrap_or(current.valid_from);
        let valid_to = input.valid_to.unwrap_or(current.valid_to);
        ensure_window(valid_from, valid_to)?;

        let existing =
            pair_pricings(&mut *tx, current.project_id, current.scaffold_component_id).await?;
        if let Some(other) = find_overlap(&existing, valid_from, valid_to, Some(pricing_id)) {
            return Err(overlap_conflict(other));
        }

        let pricing = sqlx::query_as::<_, ProjectComponentPricing>(&format!(
            r#"
            UPDATE project_component_pricings
            SET price = COALESCE($2, price),
                unit_of_measure = COALESCE($3, unit_of_measure),
                valid_from = $4,
                valid_to = $5,
                notes = COALESCE($6, notes),
                updated_utc = NOW()
            WHERE pricing_id = $1
            RETURNING {}
            "#,
            PRICING_COLUMNS
        ))
        .bind(pricing_id)
        .bind(input.price)
        .bind(input.unit_of_measure.map(|u| u.as_str()))
        .bind(valid_from)
        .bind(valid_to)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update pricing: {}", e)))?;

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(pricing_id = %pricing_id, price = %pricing.price, "Pricing updated");

        Ok(pricing)
    }

    /// Soft-delete a pricing record.
    #[instrument(skip(self), fields(pricing_id = %pricing_id))]
    pub async fn delete_pricing(&self, pricing_id: Uuid) -> Result<(), AppError> {
        self.soft_delete(
            "project_component_pricings",
            "pricing_id",
            pricing_id,
            "Pricing",
        )
        .await?;
        info!(pricing_id = %pricing_id, "Pricing deleted");
        Ok(())
    }

    /// Pricing record that applies to the pair on `as_of`, if any.
    #[instrument(skip(self), fields(project_id = %project_id, scaffold_component_id = %scaffold_component_id, as_of = %as_of))]
    pub async fn resolve_price(
        &self,
        project_id: Uuid,
        scaffold_component_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Option<ProjectComponentPricing>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_price"])
            .start_timer();

        let records = pair_pricings(&self.pool, project_id, scaffold_component_id).await?;

        timer.observe_duration();

        Ok(billing::resolve_price(&records, project_id, scaffold_component_id, as_of).cloned())
    }

    /// Every live pricing record for the given pairs, in one query.
    #[instrument(skip(self, pairs), fields(pairs = pairs.len()))]
    pub async fn load_price_book(&self, pairs: &[PricingKey]) -> Result<PriceBook, AppError> {
        if pairs.is_empty() {
            return Ok(PriceBook::default());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_price_book"])
            .start_timer();

        let (project_ids, component_ids): (Vec<Uuid>, Vec<Uuid>) = pairs.iter().copied().unzip();

        let records = sqlx::query_as::<_, ProjectComponentPricing>(&format!(
            r#"
            {}
              AND (project_id, scaffold_component_id) IN (
                  SELECT * FROM UNNEST($1::uuid[], $2::uuid[])
              )
            "#,
            active(PRICING_COLUMNS, "project_component_pricings")
        ))
        .bind(&project_ids)
        .bind(&component_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load pricings: {}", e)))?;

        timer.observe_duration();

        let book = PriceBook::new(records);
        tracing::debug!(
            requested = pairs.len(),
            priced = book.pair_count(),
            "Price book loaded"
        );
        Ok(book)
    }

    // -------------------------------------------------------------------------
    // Work Report Operations
    // -------------------------------------------------------------------------

    /// Create a draft work report. The project must belong to the client.
    #[instrument(
        skip(self, input),
        fields(number = %input.number, client_id = %input.client_id, project_id = %input.project_id)
    )]
    pub async fn create_work_report(
        &self,
        input: &CreateWorkReport,
    ) -> Result<WorkReportWithItems, AppError> {
        input.validate()?;

        self.get_client(input.client_id).await?.ok_or_else(|| {
            AppError::not_found(
                format!("Client {} not found", input.client_id),
                input.client_id,
            )
        })?;
        let project = self.get_project(input.project_id).await?.ok_or_else(|| {
            AppError::not_found(
                format!("Project {} not found", input.project_id),
                input.project_id,
            )
        })?;
        if project.client_id != input.client_id {
            return Err(AppError::validation_failed(
                format!(
                    "Project {} does not belong to client {}",
                    input.project_id, input.client_id
                ),
                vec![input.project_id],
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_work_report"])
            .start_timer();

        let report = sqlx::query_as::<_, WorkReport>(&format!(
            r#"
            INSERT INTO work_reports (work_report_id, number, client_id, project_id, work_type, status, report_date, location, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            WORK_REPORT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.number)
        .bind(input.client_id)
        .bind(input.project_id)
        .bind(input.work_type.as_str())
        .bind(WorkReportStatus::Draft.as_str())
        .bind(input.report_date)
        .bind(&input.location)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create work report: {}", e))
        })?;

        timer.observe_duration();

        WORK_REPORTS_TOTAL.with_label_values(&["created"]).inc();
        info!(
            work_report_id = %report.work_report_id,
            number = %report.number,
            "Work report created"
        );

        Ok(WorkReportWithItems {
            report,
            items: Vec::new(),
        })
    }

    /// Get a live work report with its lines.
    #[instrument(skip(self), fields(work_report_id = %work_report_id))]
    pub async fn get_work_report(
        &self,
        work_report_id: Uuid,
    ) -> Result<Option<WorkReportWithItems>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_work_report"])
            .start_timer();

        let report = sqlx::query_as::<_, WorkReport>(&format!(
            "{} AND work_report_id = $1",
            active(WORK_REPORT_COLUMNS, "work_reports")
        ))
        .bind(work_report_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get work report: {}", e))
        })?;

        let report = match report {
            Some(r) => r,
            None => return Ok(None),
        };
        let items = items_for_reports(&self.pool, &[work_report_id]).await?;

        timer.observe_duration();

        Ok(Some(WorkReportWithItems { report, items }))
    }

    /// List live work reports with their lines, newest first.
    #[instrument(skip(self))]
    pub async fn list_work_reports(
        &self,
        filter: &ListWorkReportsFilter,
    ) -> Result<Vec<WorkReportWithItems>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_work_reports"])
            .start_timer();

        let reports = sqlx::query_as::<_, WorkReport>(&format!(
            r#"
            {}
              AND ($1::uuid IS NULL OR client_id = $1)
              AND ($2::uuid IS NULL OR project_id = $2)
              AND ($3::varchar IS NULL OR status = $3)
            ORDER BY report_date DESC, created_utc DESC
            "#,
            active(WORK_REPORT_COLUMNS, "work_reports")
        ))
        .bind(filter.client_id)
        .bind(filter.project_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list work reports: {}", e))
        })?;

        let hydrated = self.hydrate(reports).await?;

        timer.observe_duration();

        Ok(hydrated)
    }

    async fn hydrate(&self, reports: Vec<WorkReport>) -> Result<Vec<WorkReportWithItems>, AppError> {
        if reports.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = reports.iter().map(|r| r.work_report_id).collect();
        let items = items_for_reports(&self.pool, &ids).await?;
        Ok(attach_items(reports, items))
    }

    /// Update the header of a draft work report.
    #[instrument(skip(self, input), fields(work_report_id = %work_report_id))]
    pub async fn update_work_report(
        &self,
        work_report_id: Uuid,
        input: &UpdateWorkReport,
    ) -> Result<WorkReportWithItems, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_work_report"])
            .start_timer();

        let mut tx = self.begin().await?;

        let current = lock_work_report(&mut *tx, work_report_id).await?;
        lifecycle::ensure_editable(&current, Edit::UpdateFields)?;

        let report = sqlx::query_as::<_, WorkReport>(&format!(
            r#"
            UPDATE work_reports
            SET number = COALESCE($2, number),
                work_type = COALESCE($3, work_type),
                report_date = COALESCE($4, report_date),
                location = COALESCE($5, location),
                notes = COALESCE($6, notes),
                updated_utc = NOW()
            WHERE work_report_id = $1
            RETURNING {}
            "#,
            WORK_REPORT_COLUMNS
        ))
        .bind(work_report_id)
        .bind(&input.number)
        .bind(input.work_type.map(|t| t.as_str()))
        .bind(input.report_date)
        .bind(&input.location)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update work report: {}", e))
        })?;

        let items = items_for_reports(&mut *tx, &[work_report_id]).await?;

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(work_report_id = %work_report_id, "Work report updated");

        Ok(WorkReportWithItems { report, items })
    }

    /// Soft-delete a work report in any status.
    #[instrument(skip(self), fields(work_report_id = %work_report_id))]
    pub async fn delete_work_report(&self, work_report_id: Uuid) -> Result<(), AppError> {
        self.soft_delete(
            "work_reports",
            "work_report_id",
            work_report_id,
            "Work report",
        )
        .await?;
        WORK_REPORTS_TOTAL.with_label_values(&["deleted"]).inc();
        info!(work_report_id = %work_report_id, "Work report deleted");
        Ok(())
    }

    /// Add a line to a draft work report.
    ///
    /// A price must apply to the component on the report date; lines that
    /// could not be billed are refused at entry.
    #[instrument(
        skip(self, input),
        fields(work_report_id = %work_report_id, scaffold_component_id = %input.scaffold_component_id)
    )]
    pub async fn add_item(
        &self,
        work_report_id: Uuid,
        input: &CreateWorkReportItem,
    ) -> Result<WorkReportItem, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        let report = lock_work_report(&mut *tx, work_report_id).await?;
        lifecycle::ensure_editable(&report, Edit::AddItem)?;

        let component_id = input.scaffold_component_id;
        sqlx::query_scalar::<_, Uuid>(&format!(
            "{} AND scaffold_component_id = $1",
            active("scaffold_component_id", "scaffold_components")
        ))
        .bind(component_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get component: {}", e)))?
        .ok_or_else(|| {
            AppError::not_found(format!("Component {} not found", component_id), component_id)
        })?;

        let records = pair_pricings(&mut *tx, report.project_id, component_id).await?;
        if billing::resolve_price(&records, report.project_id, component_id, report.report_date)
            .is_none()
        {
            return Err(AppError::validation_failed(
                format!(
                    "No price defined for component {} in project {} on {}",
                    component_id, report.project_id, report.report_date
                ),
                vec![component_id],
            ));
        }

        let sort_order = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM work_report_items WHERE work_report_id = $1",
        )
        .bind(work_report_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute line position: {}", e))
        })?;

        let item = sqlx::query_as::<_, WorkReportItem>(
            r#"
            WITH inserted AS (
                INSERT INTO work_report_items
                    (work_report_item_id, work_report_id, scaffold_component_id, quantity, length, weight, unit_of_measure, notes, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
            )
            SELECT i.work_report_item_id, i.work_report_id, i.scaffold_component_id,
                   c.name AS component_name, i.quantity, i.length, i.weight,
                   i.unit_of_measure, i.notes, i.sort_order, i.created_utc
            FROM inserted i
            JOIN scaffold_components c ON c.scaffold_component_id = i.scaffold_component_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(work_report_id)
        .bind(component_id)
        .bind(input.quantity)
        .bind(input.length)
        .bind(input.weight)
        .bind(input.unit_of_measure.as_str())
        .bind(&input.notes)
        .bind(sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to add work report item: {}", e))
        })?;

        sqlx::query("UPDATE work_reports SET updated_utc = NOW() WHERE work_report_id = $1")
            .bind(work_report_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to touch work report: {}", e))
            })?;

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(
            work_report_id = %work_report_id,
            work_report_item_id = %item.work_report_item_id,
            quantity = %item.quantity,
            "Work report item added"
        );

        Ok(item)
    }

    /// Remove a line from a draft work report.
    #[instrument(skip(self), fields(work_report_id = %work_report_id, work_report_item_id = %work_report_item_id))]
    pub async fn remove_item(
        &self,
        work_report_id: Uuid,
        work_report_item_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        let report = lock_work_report(&mut *tx, work_report_id).await?;
        lifecycle::ensure_editable(&report, Edit::RemoveItem)?;

        let result = sqlx::query(
            "DELETE FROM work_report_items WHERE work_report_item_id = $1 AND work_report_id = $2",
        )
        .bind(work_report_item_id)
        .bind(work_report_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to remove work report item: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(
                format!(
                    "Item {} not found on work report {}",
                    work_report_item_id, report.number
                ),
                work_report_item_id,
            ));
        }

        Self::commit(tx).await?;

        timer.observe_duration();

        info!(work_report_id = %work_report_id, work_report_item_id = %work_report_item_id, "Work report item removed");

        Ok(())
    }

    /// Bill a work report on its own.
    ///
    /// The status check and the status change happen under the report row
    /// lock, so a report is billed at most once.
    #[instrument(skip(self), fields(work_report_id = %work_report_id))]
    pub async fn bill(&self, work_report_id: Uuid) -> Result<WorkReport, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["bill_work_report"])
            .start_timer();

        let result: Result<WorkReport, AppError> = async {
            let mut tx = self.begin().await?;

            let report = lock_work_report(&mut *tx, work_report_id).await?;
            let item_count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM work_report_items WHERE work_report_id = $1",
            )
            .bind(work_report_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count items: {}", e)))?;

            let next = lifecycle::bill(&report, item_count as usize)?;

            let billed = sqlx::query_as::<_, WorkReport>(&format!(
                r#"
                UPDATE work_reports SET status = $2, updated_utc = NOW()
                WHERE work_report_id = $1
                RETURNING {}
                "#,
                WORK_REPORT_COLUMNS
            ))
            .bind(work_report_id)
            .bind(next.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to bill work report: {}", e))
            })?;

            Self::commit(tx).await?;
            Ok(billed)
        }
        .await;

        timer.observe_duration();

        match result {
            Ok(billed) => {
                WORK_REPORTS_TOTAL.with_label_values(&["billed"]).inc();
                info!(work_report_id = %work_report_id, number = %billed.number, "Work report billed");
                Ok(billed)
            }
            Err(e) => {
                record_error(&e);
                Err(e)
            }
        }
    }

    /// Value of a work report at its report date.
    #[instrument(skip(self), fields(work_report_id = %work_report_id))]
    pub async fn value_work_report(&self, work_report_id: Uuid) -> Result<Valuation, AppError> {
        let report = self.require_work_report(work_report_id).await?;
        let reports = [report];
        let prices = self.load_price_book(&pricing_keys(&reports)).await?;
        let valuation = value_reports(&reports, ValuationDate::ReportDate, &prices);
        record_unpriced("work_report", valuation.unpriced_lines);
        Ok(valuation)
    }

    async fn require_work_report(
        &self,
        work_report_id: Uuid,
    ) -> Result<WorkReportWithItems, AppError> {
        self.get_work_report(work_report_id).await?.ok_or_else(|| {
            AppError::not_found(
                format!("Work report {} not found", work_report_id),
                work_report_id,
            )
        })
    }

    // -------------------------------------------------------------------------
    // Proforma Operations
    // -------------------------------------------------------------------------

    /// Create a proforma from draft work reports and bill them, atomically.
    /// A missing issue date is set to today before the request is checked.
    #[instrument(skip(self, input), fields(number = %input.number, client_id = %input.client_id))]
    pub async fn create_proforma(
        &self,
        mut input: CreateProforma,
    ) -> Result<ProformaDetails, AppError> {
        input
            .issue_date
            .get_or_insert_with(|| Utc::now().date_naive());

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_proforma"])
            .start_timer();

        let result: Result<ProformaDetails, AppError> = async {
            input.validate()?;
            let uow = PgUnitOfWork::begin(&self.pool).await?;
            billing::create_proforma(uow, input).await
        }
        .await;

        timer.observe_duration();

        match result {
            Ok(details) => {
                PROFORMAS_TOTAL.with_label_values(&["created"]).inc();
                WORK_REPORTS_TOTAL
                    .with_label_values(&["billed"])
                    .inc_by(details.items.len() as f64);
                Ok(details)
            }
            Err(e) => {
                PROFORMAS_TOTAL.with_label_values(&["rejected"]).inc();
                record_error(&e);
                if e.is_infrastructure() {
                    warn!(error = %e, "Proforma creation failed");
                }
                Err(e)
            }
        }
    }

    /// Get a live proforma with its client and work reports.
    #[instrument(skip(self), fields(proforma_invoice_id = %proforma_invoice_id))]
    pub async fn get_proforma(
        &self,
        proforma_invoice_id: Uuid,
    ) -> Result<Option<ProformaDetails>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_proforma"])
            .start_timer();

        let proforma = sqlx::query_as::<_, ProformaInvoice>(&format!(
            "{} AND proforma_invoice_id = $1",
            active(PROFORMA_COLUMNS, "proforma_invoices")
        ))
        .bind(proforma_invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get proforma: {}", e)))?;

        let details = match proforma {
            Some(p) => self.hydrate_proformas(vec![p]).await?.pop(),
            None => None,
        };

        timer.observe_duration();

        Ok(details)
    }

    /// List live proformas, newest first.
    #[instrument(skip(self))]
    pub async fn list_proformas(&self) -> Result<Vec<ProformaDetails>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_proformas"])
            .start_timer();

        let proformas = sqlx::query_as::<_, ProformaInvoice>(&format!(
            "{} ORDER BY created_utc DESC, proforma_invoice_id",
            active(PROFORMA_COLUMNS, "proforma_invoices")
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list proformas: {}", e)))?;

        let details = self.hydrate_proformas(proformas).await?;

        timer.observe_duration();

        Ok(details)
    }

    async fn hydrate_proformas(
        &self,
        proformas: Vec<ProformaInvoice>,
    ) -> Result<Vec<ProformaDetails>, AppError> {
        if proformas.is_empty() {
            return Ok(Vec::new());
        }

        let proforma_ids: Vec<Uuid> = proformas.iter().map(|p| p.proforma_invoice_id).collect();
        let client_ids: Vec<Uuid> = proformas.iter().map(|p| p.client_id).collect();

        let links = sqlx::query_as::<_, ProformaInvoiceItem>(&format!(
            r#"
            SELECT {} FROM proforma_invoice_items
            WHERE proforma_invoice_id = ANY($1)
            ORDER BY proforma_invoice_id, sort_order
            "#,
            PROFORMA_ITEM_COLUMNS
        ))
        .bind(&proforma_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load proforma items: {}", e))
        })?;

        // Clients are loaded regardless of soft delete: a proforma keeps
        // printing the client it was issued to.
        let clients: HashMap<Uuid, Client> = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE client_id = ANY($1)",
            CLIENT_COLUMNS
        ))
        .bind(&client_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load clients: {}", e)))?
        .into_iter()
        .map(|c| (c.client_id, c))
        .collect();

        // A claimed report stays on its proforma even after it is deleted.
        let report_ids: Vec<Uuid> = links.iter().map(|l| l.work_report_id).collect();
        let reports = sqlx::query_as::<_, WorkReport>(&format!(
            "SELECT {} FROM work_reports WHERE work_report_id = ANY($1)",
            WORK_REPORT_COLUMNS
        ))
        .bind(&report_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load work reports: {}", e))
        })?;
        let mut reports: HashMap<Uuid, WorkReportWithItems> = self
            .hydrate(reports)
            .await?
            .into_iter()
            .map(|r| (r.report.work_report_id, r))
            .collect();

        let mut items_by_proforma: HashMap<Uuid, Vec<ProformaItemDetails>> = HashMap::new();
        for item in links {
            if let Some(work_report) = reports.remove(&item.work_report_id) {
                items_by_proforma
                    .entry(item.proforma_invoice_id)
                    .or_default()
                    .push(ProformaItemDetails { item, work_report });
            }
        }

        proformas
            .into_iter()
            .map(|proforma| {
                let client = clients.get(&proforma.client_id).cloned().ok_or_else(|| {
                    AppError::InternalError(anyhow::anyhow!(
                        "Client {} of proforma {} is missing",
                        proforma.client_id,
                        proforma.proforma_invoice_id
                    ))
                })?;
                let items = items_by_proforma
                    .remove(&proforma.proforma_invoice_id)
                    .unwrap_or_default();
                Ok(ProformaDetails {
                    proforma,
                    client,
                    items,
                })
            })
            .collect()
    }

    /// Soft-delete a proforma. Its work reports stay billed and claimed.
    #[instrument(skip(self), fields(proforma_invoice_id = %proforma_invoice_id))]
    pub async fn delete_proforma(&self, proforma_invoice_id: Uuid) -> Result<(), AppError> {
        self.soft_delete(
            "proforma_invoices",
            "proforma_invoice_id",
            proforma_invoice_id,
            "Proforma",
        )
        .await?;
        info!(proforma_invoice_id = %proforma_invoice_id, "Proforma deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Views and Documents
    // -------------------------------------------------------------------------

    /// Live counts plus the unbilled and proforma valuations.
    #[instrument(skip(self), fields(as_of = %as_of))]
    pub async fn dashboard_summary(&self, as_of: NaiveDate) -> Result<DashboardSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard_summary"])
            .start_timer();

        let counts = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(&format!(
            "SELECT ({}), ({}), ({}), ({}), ({} AND status = $1), ({})",
            active("COUNT(*)", "clients"),
            active("COUNT(*)", "projects"),
            active("COUNT(*)", "scaffold_components"),
            active("COUNT(*)", "work_reports"),
            active("COUNT(*)", "work_reports"),
            active("COUNT(*)", "proforma_invoices"),
        ))
        .bind(WorkReportStatus::Draft.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count records: {}", e)))?;

        timer.observe_duration();

        let unbilled = self
            .list_work_reports(&ListWorkReportsFilter {
                status: Some(WorkReportStatus::Draft),
                ..Default::default()
            })
            .await?;
        let unbilled_prices = self.load_price_book(&pricing_keys(&unbilled)).await?;
        let unbilled_value = value_reports(&unbilled, ValuationDate::Fixed(as_of), &unbilled_prices);
        record_unpriced("unbilled", unbilled_value.unpriced_lines);

        let billed = self.proformed_work_reports().await?;
        let billed_prices = self.load_price_book(&pricing_keys(&billed)).await?;
        let proformas_value = value_reports(&billed, ValuationDate::ReportDate, &billed_prices);
        record_unpriced("proformas", proformas_value.unpriced_lines);

        let (
            total_clients,
            total_projects,
            total_components,
            total_work_reports,
            unbilled_work_reports,
            total_proformas,
        ) = counts;

        Ok(DashboardSummary {
            total_clients,
            total_projects,
            total_components,
            total_work_reports,
            unbilled_work_reports,
            total_proformas,
            unbilled_value,
            proformas_value,
        })
    }

    /// Work reports included in a live proforma, deleted or not.
    async fn proformed_work_reports(&self) -> Result<Vec<WorkReportWithItems>, AppError> {
        let reports = sqlx::query_as::<_, WorkReport>(&format!(
            r#"
            SELECT {} FROM work_reports
            WHERE work_report_id IN (
                  SELECT pi.work_report_id
                  FROM proforma_invoice_items pi
                  JOIN proforma_invoices p ON p.proforma_invoice_id = pi.proforma_invoice_id
                  WHERE p.deleted_utc IS NULL
              )
            "#,
            WORK_REPORT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load billed work reports: {}", e))
        })?;
        self.hydrate(reports).await
    }

    /// Printable model of a work report.
    #[instrument(skip(self), fields(work_report_id = %work_report_id))]
    pub async fn work_report_document(
        &self,
        work_report_id: Uuid,
    ) -> Result<WorkReportDocument, AppError> {
        let report = self.require_work_report(work_report_id).await?;
        let client = self.get_client(report.report.client_id).await?.ok_or_else(|| {
            AppError::not_found(
                format!("Client {} not found", report.report.client_id),
                report.report.client_id,
            )
        })?;
        let project = self
            .get_project(report.report.project_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    format!("Project {} not found", report.report.project_id),
                    report.report.project_id,
                )
            })?;

        let reports = [report];
        let prices = self.load_price_book(&pricing_keys(&reports)).await?;
        let document = WorkReportDocument::build(
            &reports[0],
            &client,
            &project,
            &prices,
            &self.billing.currency,
        );
        record_unpriced("work_report_document", document.unpriced_lines);
        Ok(document)
    }

    /// Printable model of a proforma.
    #[instrument(skip(self), fields(proforma_invoice_id = %proforma_invoice_id))]
    pub async fn proforma_document(
        &self,
        proforma_invoice_id: Uuid,
    ) -> Result<ProformaDocument, AppError> {
        let details = self
            .get_proforma(proforma_invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    format!("Proforma {} not found", proforma_invoice_id),
                    proforma_invoice_id,
                )
            })?;

        let reports: Vec<WorkReportWithItems> =
            details.items.iter().map(|i| i.work_report.clone()).collect();
        let prices = self.load_price_book(&pricing_keys(&reports)).await?;
        let projects = self.list_projects(Some(details.client.client_id)).await?;

        let document =
            ProformaDocument::build(&details, &projects, &prices, &self.billing.currency);
        record_unpriced("proforma_document", document.unpriced_lines);
        Ok(document)
    }

    /// Printable model of a contract. The client is printed even if it has
    /// since been deleted.
    #[instrument(skip(self), fields(contract_id = %contract_id))]
    pub async fn contract_document(&self, contract_id: Uuid) -> Result<ContractDocument, AppError> {
        let contract = self.get_contract(contract_id).await?.ok_or_else(|| {
            AppError::not_found(format!("Contract {} not found", contract_id), contract_id)
        })?;

        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE client_id = $1",
            CLIENT_COLUMNS
        ))
        .bind(contract.client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load client: {}", e)))?
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Client {} of contract {} is missing",
                contract.client_id,
                contract_id
            ))
        })?;

        Ok(ContractDocument::build(&contract, &client))
    }
}

async fn fetch_project<'e, E>(executor: E, project_id: Uuid) -> Result<Option<Project>, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Project>(&format!(
        "{} AND project_id = $1",
        active(PROJECT_COLUMNS, "projects")
    ))
    .bind(project_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get project: {}", e)))
}

/// Lock a live component row for the rest of the transaction.
async fn lock_component<'e, E>(
    executor: E,
    scaffold_component_id: Uuid,
) -> Result<ScaffoldComponent, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ScaffoldComponent>(&format!(
        "{} AND scaffold_component_id = $1 FOR UPDATE",
        active(COMPONENT_COLUMNS, "scaffold_components")
    ))
    .bind(scaffold_component_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock component: {}", e)))?
    .ok_or_else(|| {
        AppError::not_found(
            format!("Component {} not found", scaffold_component_id),
            scaffold_component_id,
        )
    })
}

/// Lock a live work report row for the rest of the transaction.
async fn lock_work_report<'e, E>(executor: E, work_report_id: Uuid) -> Result<WorkReport, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WorkReport>(&format!(
        "{} AND work_report_id = $1 FOR UPDATE",
        active(WORK_REPORT_COLUMNS, "work_reports")
    ))
    .bind(work_report_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock work report: {}", e)))?
    .ok_or_else(|| {
        AppError::not_found(
            format!("Work report {} not found", work_report_id),
            work_report_id,
        )
    })
}

/// Live pricing records of one (project, component) pair.
async fn pair_pricings<'e, E>(
    executor: E,
    project_id: Uuid,
    scaffold_component_id: Uuid,
) -> Result<Vec<ProjectComponentPricing>, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ProjectComponentPricing>(&format!(
        "{} AND project_id = $1 AND scaffold_component_id = $2 ORDER BY valid_from",
        active(PRICING_COLUMNS, "project_component_pricings")
    ))
    .bind(project_id)
    .bind(scaffold_component_id)
    .fetch_all(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load pricings: {}", e)))
}

/// Reject a contract period that ends before it starts.
fn ensure_contract_period(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), AppError> {
    match end {
        Some(end) if end < start => Err(AppError::validation_failed(
            format!("Contract ends ({}) before it starts ({})", end, start),
            Vec::new(),
        )),
        _ => Ok(()),
    }
}

fn overlap_conflict(other: &ProjectComponentPricing) -> AppError {
    AppError::Conflict(
        format!(
            "Pricing window overlaps existing pricing {} ({} to {})",
            other.pricing_id,
            other.valid_from,
            other
                .valid_to
                .map_or_else(|| "open".to_string(), |d| d.to_string())
        ),
        vec![other.pricing_id],
    )
}
