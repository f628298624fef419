use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_tenants_table::Migration),
            Box::new(m20240101_000002_create_products_table::Migration),
            Box::new(m20240101_000003_create_invoices_table::Migration),
            Box::new(m20240101_000004_create_invoice_lines_table::Migration),
            Box::new(m20240101_000005_create_payments_table::Migration),
            Box::new(m20240101_000006_create_stock_tables::Migration),
            Box::new(m20240101_000007_create_invoice_sequences_table::Migration),
            Box::new(m20240101_000008_create_invoice_history_table::Migration),
        ]
    }
}

mod m20240101_000001_create_tenants_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_tenants_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tenants::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tenants::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Tenants::Name).string().not_null())
                        .col(ColumnDef::new(Tenants::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Tenants::HardStockEnforcement)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Tenants::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Tenants::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Tenants::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Tenants {
        Table,
        Id,
        Name,
        Currency,
        HardStockEnforcement,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Stockable)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Products::StockLocation).string().not_null())
                        .col(
                            ColumnDef::new(Products::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_tenant_sku")
                        .table(Products::Table)
                        .col(Products::TenantId)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        TenantId,
        Sku,
        Name,
        Stockable,
        StockLocation,
        UnitPrice,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_invoices_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Invoices::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::PatientId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::EncounterId).uuid().null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).big_integer().null())
                        .col(ColumnDef::new(Invoices::Currency).string().not_null())
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(
                            ColumnDef::new(Invoices::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::TotalDiscount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::TotalTax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::TotalPaid)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::Outstanding)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::CreditBalance)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::LineSeq)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Invoices::IssuedAt).timestamp().null())
                        .col(ColumnDef::new(Invoices::PostedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Invoices::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Invoices::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Invoices::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_tenant_status")
                        .table(Invoices::Table)
                        .col(Invoices::TenantId)
                        .col(Invoices::Status)
                        .to_owned(),
                )
                .await?;

            // One invoice number per tenant, once assigned.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_tenant_number")
                        .table(Invoices::Table)
                        .col(Invoices::TenantId)
                        .col(Invoices::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        TenantId,
        PatientId,
        EncounterId,
        InvoiceNumber,
        Currency,
        Status,
        Subtotal,
        TotalDiscount,
        TotalTax,
        Total,
        TotalPaid,
        Outstanding,
        CreditBalance,
        LineSeq,
        IssuedAt,
        PostedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_invoice_lines_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_invoice_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceLines::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(InvoiceLines::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(InvoiceLines::LineNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceLines::Kind).string().not_null())
                        .col(ColumnDef::new(InvoiceLines::ProductId).uuid().null())
                        .col(ColumnDef::new(InvoiceLines::Description).string().not_null())
                        .col(ColumnDef::new(InvoiceLines::Quantity).integer().not_null())
                        .col(ColumnDef::new(InvoiceLines::UnitPrice).decimal().not_null())
                        .col(
                            ColumnDef::new(InvoiceLines::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InvoiceLines::TaxAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(InvoiceLines::NetAmount).decimal().not_null())
                        .col(
                            ColumnDef::new(InvoiceLines::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceLines::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_lines_invoice_id")
                        .table(InvoiceLines::Table)
                        .col(InvoiceLines::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceLines {
        Table,
        Id,
        InvoiceId,
        TenantId,
        LineNumber,
        Kind,
        ProductId,
        Description,
        Quantity,
        UnitPrice,
        DiscountAmount,
        TaxAmount,
        NetAmount,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(Payments::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Amount).decimal().not_null())
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(ColumnDef::new(Payments::ReversalOf).uuid().null())
                        .col(ColumnDef::new(Payments::ReceivedAt).timestamp().not_null())
                        .col(ColumnDef::new(Payments::RecordedBy).uuid().null())
                        .col(ColumnDef::new(Payments::IdempotencyKey).string().null())
                        .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await?;

            // Replay guard for retried payment requests. NULL keys are not
            // constrained, so untagged payments stay unrestricted.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_tenant_idempotency_key")
                        .table(Payments::Table)
                        .col(Payments::TenantId)
                        .col(Payments::IdempotencyKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        InvoiceId,
        TenantId,
        Amount,
        Method,
        ReversalOf,
        ReceivedAt,
        RecordedBy,
        IdempotencyKey,
        CreatedAt,
    }
}

mod m20240101_000006_create_stock_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLedgerEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::Location)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::QuantityDelta)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::InvoiceId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::InvoiceLineId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::Direction)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Idempotency key: one entry per line and direction.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_line_direction")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::InvoiceLineId)
                        .col(StockLedgerEntries::Direction)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockLevels::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::Location).string().not_null())
                        .col(
                            ColumnDef::new(StockLevels::OnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockLevels::UpdatedAt).timestamp().not_null())
                        .primary_key(
                            Index::create()
                                .col(StockLevels::TenantId)
                                .col(StockLevels::ProductId)
                                .col(StockLevels::Location),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLedgerEntries {
        Table,
        Id,
        TenantId,
        ProductId,
        Location,
        QuantityDelta,
        InvoiceId,
        InvoiceLineId,
        Direction,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockLevels {
        Table,
        TenantId,
        ProductId,
        Location,
        OnHand,
        UpdatedAt,
    }
}

mod m20240101_000007_create_invoice_sequences_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_invoice_sequences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceSequences::TenantId)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceSequences::NextNumber)
                                .big_integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InvoiceSequences::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceSequences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceSequences {
        Table,
        TenantId,
        NextNumber,
        UpdatedAt,
    }
}

mod m20240101_000008_create_invoice_history_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_invoice_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceHistory::TenantId).uuid().not_null())
                        .col(ColumnDef::new(InvoiceHistory::InvoiceId).uuid().not_null())
                        .col(
                            ColumnDef::new(InvoiceHistory::EntityType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceHistory::EntityId).uuid().not_null())
                        .col(ColumnDef::new(InvoiceHistory::Field).string().not_null())
                        .col(ColumnDef::new(InvoiceHistory::OldValue).string().null())
                        .col(ColumnDef::new(InvoiceHistory::NewValue).string().null())
                        .col(ColumnDef::new(InvoiceHistory::Actor).uuid().null())
                        .col(
                            ColumnDef::new(InvoiceHistory::RecordedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_history_invoice_id")
                        .table(InvoiceHistory::Table)
                        .col(InvoiceHistory::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceHistory {
        Table,
        Id,
        TenantId,
        InvoiceId,
        EntityType,
        EntityId,
        Field,
        OldValue,
        NewValue,
        Actor,
        RecordedAt,
    }
}
