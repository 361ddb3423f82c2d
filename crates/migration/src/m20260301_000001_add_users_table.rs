use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Member records consumed by the communications core. The
/// `whatsapp_reminders_sent` JSON array holds the reminder-kind tags the
/// expiry scanner has already issued.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Email))
                    .col(string(Users::FirstName))
                    .col(string(Users::LastName))
                    .col(timestamp_with_time_zone_null(Users::LastLoginAt))
                    .col(
                        timestamp_with_time_zone(Users::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(boolean(Users::TermsAccepted).default(false))
                    .col(boolean(Users::DisclaimerAccepted).default(false))
                    .col(boolean(Users::HasWhatsappSupport).default(false))
                    .col(timestamp_with_time_zone_null(Users::WhatsappSupportExpiryDate))
                    .col(json(Users::WhatsappRemindersSent))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_users_last_login_at")
                    .table(Users::Table)
                    .col(Users::LastLoginAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_users_last_login_at")
                    .table(Users::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    LastLoginAt,
    CreatedAt,
    TermsAccepted,
    DisclaimerAccepted,
    HasWhatsappSupport,
    WhatsappSupportExpiryDate,
    WhatsappRemindersSent,
}
