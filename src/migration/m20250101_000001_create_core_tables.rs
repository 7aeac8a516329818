use sea_orm_migration::prelude::*;

/// Tables métier: users, trading_signals, payments, coupons, questionnaires
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::FirstName).string().null())
                    .col(ColumnDef::new(Users::LastName).string().null())
                    .col(ColumnDef::new(Users::Phone).string().null())
                    .col(ColumnDef::new(Users::Country).string().null())
                    .col(ColumnDef::new(Users::TradingExperience).string().null())
                    .col(ColumnDef::new(Users::ReferralSource).string().null())
                    .col(
                        ColumnDef::new(Users::NewsletterOptIn)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::PlanType)
                            .string_len(16)
                            .not_null()
                            .default("free"),
                    )
                    .col(
                        ColumnDef::new(Users::Role)
                            .string_len(16)
                            .not_null()
                            .default("user"),
                    )
                    .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TradingSignals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TradingSignals::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TradingSignals::Pair).string_len(32).not_null())
                    .col(ColumnDef::new(TradingSignals::Direction).string_len(8).not_null())
                    .col(ColumnDef::new(TradingSignals::EntryPrice).double().not_null())
                    .col(ColumnDef::new(TradingSignals::StopLoss).double().not_null())
                    .col(ColumnDef::new(TradingSignals::TakeProfit).double().not_null())
                    .col(ColumnDef::new(TradingSignals::Confidence).integer().not_null())
                    .col(ColumnDef::new(TradingSignals::Timeframe).string_len(16).null())
                    .col(ColumnDef::new(TradingSignals::Analysis).text().null())
                    .col(ColumnDef::new(TradingSignals::Status).string_len(16).not_null())
                    .col(ColumnDef::new(TradingSignals::Source).string_len(16).not_null())
                    .col(ColumnDef::new(TradingSignals::ExternalId).string().null().unique_key())
                    .col(ColumnDef::new(TradingSignals::CreatedBy).integer().null())
                    .col(
                        ColumnDef::new(TradingSignals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TradingSignals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TradingSignals::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trading_signals_created_by")
                            .from(TradingSignals::Table, TradingSignals::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_trading_signals_status")
                    .table(TradingSignals::Table)
                    .col(TradingSignals::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::UserId).integer().not_null())
                    .col(ColumnDef::new(Payments::PlanType).string_len(16).not_null())
                    .col(ColumnDef::new(Payments::AmountCents).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::DiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Payments::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Payments::CouponCode).string().null())
                    .col(ColumnDef::new(Payments::PaymentMethod).string_len(32).not_null())
                    .col(ColumnDef::new(Payments::CardLast4).string_len(4).null())
                    .col(
                        ColumnDef::new(Payments::ProviderReference)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Payments::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Payments::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_user")
                            .from(Payments::Table, Payments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Coupons::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Coupons::Code).string_len(64).not_null().unique_key())
                    .col(ColumnDef::new(Coupons::DiscountPercent).integer().not_null())
                    .col(ColumnDef::new(Coupons::MaxUses).integer().null())
                    .col(ColumnDef::new(Coupons::UsedCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Coupons::Active).boolean().not_null().default(true))
                    .col(ColumnDef::new(Coupons::ExpiresAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Coupons::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Questionnaires::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Questionnaires::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Questionnaires::UserId)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Questionnaires::ExperienceLevel).string_len(16).not_null())
                    .col(ColumnDef::new(Questionnaires::TradingStyle).string().null())
                    .col(ColumnDef::new(Questionnaires::RiskTolerance).string_len(16).not_null())
                    .col(ColumnDef::new(Questionnaires::PreferredPairs).text().not_null())
                    .col(ColumnDef::new(Questionnaires::AccountSize).string().null())
                    .col(ColumnDef::new(Questionnaires::Goals).text().null())
                    .col(
                        ColumnDef::new(Questionnaires::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Questionnaires::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_questionnaires_user")
                            .from(Questionnaires::Table, Questionnaires::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Questionnaires::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Coupons::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TradingSignals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    FirstName,
    LastName,
    Phone,
    Country,
    TradingExperience,
    ReferralSource,
    NewsletterOptIn,
    PlanType,
    Role,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TradingSignals {
    Table,
    Id,
    Pair,
    Direction,
    EntryPrice,
    StopLoss,
    TakeProfit,
    Confidence,
    Timeframe,
    Analysis,
    Status,
    Source,
    ExternalId,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
    ClosedAt,
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    UserId,
    PlanType,
    AmountCents,
    DiscountCents,
    Currency,
    CouponCode,
    PaymentMethod,
    CardLast4,
    ProviderReference,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    Code,
    DiscountPercent,
    MaxUses,
    UsedCount,
    Active,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Questionnaires {
    Table,
    Id,
    UserId,
    ExperienceLevel,
    TradingStyle,
    RiskTolerance,
    PreferredPairs,
    AccountSize,
    Goals,
    CreatedAt,
    UpdatedAt,
}
