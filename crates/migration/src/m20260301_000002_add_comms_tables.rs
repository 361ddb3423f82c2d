use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Automation rules, the append-only communications log, and the
/// campaign tables. The communications_log index covers exactly the
/// dedup query: (user_id, message_type, status, created_at).
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AutomationRules::Table)
                    .if_not_exists()
                    .col(pk_auto(AutomationRules::Id))
                    .col(string(AutomationRules::Name))
                    .col(string_uniq(AutomationRules::TriggerType))
                    .col(string(AutomationRules::Subject))
                    .col(text(AutomationRules::HtmlContent))
                    .col(boolean(AutomationRules::Enabled).default(true))
                    .col(integer(AutomationRules::TimesSent).default(0))
                    .col(
                        timestamp_with_time_zone(AutomationRules::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommunicationsLog::Table)
                    .if_not_exists()
                    .col(pk_auto(CommunicationsLog::Id))
                    .col(string(CommunicationsLog::Channel))
                    .col(string(CommunicationsLog::Direction))
                    .col(string(CommunicationsLog::Provider))
                    .col(string(CommunicationsLog::RecipientEmail))
                    .col(string_null(CommunicationsLog::RecipientName))
                    .col(integer_null(CommunicationsLog::UserId))
                    .col(string(CommunicationsLog::Subject))
                    .col(text(CommunicationsLog::ContentPreview))
                    .col(string(CommunicationsLog::MessageType))
                    .col(string(CommunicationsLog::Status))
                    .col(string_null(CommunicationsLog::ProviderMessageId))
                    .col(text_null(CommunicationsLog::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(CommunicationsLog::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_comms_log_dedup")
                    .table(CommunicationsLog::Table)
                    .col(CommunicationsLog::UserId)
                    .col(CommunicationsLog::MessageType)
                    .col(CommunicationsLog::Status)
                    .col(CommunicationsLog::CreatedAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_comms_log_created_at")
                    .table(CommunicationsLog::Table)
                    .col(CommunicationsLog::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailCampaigns::Table)
                    .if_not_exists()
                    .col(pk_auto(EmailCampaigns::Id))
                    .col(string(EmailCampaigns::Name))
                    .col(string(EmailCampaigns::Subject))
                    .col(text(EmailCampaigns::HtmlContent))
                    .col(string(EmailCampaigns::Status).default("draft"))
                    .col(timestamp_with_time_zone_null(EmailCampaigns::ScheduledFor))
                    .col(timestamp_with_time_zone_null(EmailCampaigns::SentAt))
                    .col(integer(EmailCampaigns::SentCount).default(0))
                    .col(integer(EmailCampaigns::FailedCount).default(0))
                    .col(
                        timestamp_with_time_zone(EmailCampaigns::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_email_campaigns_status")
                    .table(EmailCampaigns::Table)
                    .col(EmailCampaigns::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CampaignRecipients::Table)
                    .if_not_exists()
                    .col(pk_auto(CampaignRecipients::Id))
                    .col(integer(CampaignRecipients::CampaignId))
                    .col(integer(CampaignRecipients::UserId))
                    .col(string(CampaignRecipients::Status).default("pending"))
                    .col(timestamp_with_time_zone_null(CampaignRecipients::SentAt))
                    .col(string_null(CampaignRecipients::ProviderMessageId))
                    .col(text_null(CampaignRecipients::ErrorMessage))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_recipients_campaign")
                            .from(CampaignRecipients::Table, CampaignRecipients::CampaignId)
                            .to(EmailCampaigns::Table, EmailCampaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    // No FK on user_id: the users table is consumed, not
                    // owned, and a recipient whose user has vanished is a
                    // handled input (marked failed), not a constraint error.
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_recipients_campaign_status")
                    .table(CampaignRecipients::Table)
                    .col(CampaignRecipients::CampaignId)
                    .col(CampaignRecipients::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CampaignRecipients::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailCampaigns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CommunicationsLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AutomationRules::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum AutomationRules {
    Table,
    Id,
    Name,
    TriggerType,
    Subject,
    HtmlContent,
    Enabled,
    TimesSent,
    CreatedAt,
}

#[derive(Iden)]
pub enum CommunicationsLog {
    Table,
    Id,
    Channel,
    Direction,
    Provider,
    RecipientEmail,
    RecipientName,
    UserId,
    Subject,
    ContentPreview,
    MessageType,
    Status,
    ProviderMessageId,
    ErrorMessage,
    CreatedAt,
}

#[derive(Iden)]
pub enum EmailCampaigns {
    Table,
    Id,
    Name,
    Subject,
    HtmlContent,
    Status,
    ScheduledFor,
    SentAt,
    SentCount,
    FailedCount,
    CreatedAt,
}

#[derive(Iden)]
pub enum CampaignRecipients {
    Table,
    Id,
    CampaignId,
    UserId,
    Status,
    SentAt,
    ProviderMessageId,
    ErrorMessage,
}
