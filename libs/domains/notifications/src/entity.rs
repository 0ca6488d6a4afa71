//! SeaORM entity for the `notifications` table.
//!
//! Kind and status are stored as their wire strings; converting back into
//! the domain enums can fail on a corrupted row, which is why the conversion
//! into [`Notification`] is a `TryFrom`.

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

use crate::error::NotificationError;
use crate::models::{Content, Notification, Recipient};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub recipient_id: String,
    pub recipient_email: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_device: Option<String>,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,
    pub data: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub html: Option<String>,
    pub template: Option<String>,
    pub status: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub provider_response: Option<String>,
    pub created_at: DateTimeUtc,
    pub sent_at: Option<DateTimeUtc>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Notification {
    type Error = NotificationError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = model.kind.parse().map_err(|_| {
            NotificationError::Database(format!(
                "notification {} has invalid stored kind '{}'",
                model.id, model.kind
            ))
        })?;
        let status = model.status.parse().map_err(|_| {
            NotificationError::Database(format!(
                "notification {} has invalid stored status '{}'",
                model.id, model.status
            ))
        })?;

        Ok(Notification {
            id: model.id,
            kind,
            recipient: Recipient {
                id: model.recipient_id,
                email: model.recipient_email,
                phone: model.recipient_phone,
                device_id: model.recipient_device,
            },
            content: Content {
                title: model.title,
                body: model.body,
                data: model.data,
                html: model.html,
                template: model.template,
            },
            status,
            provider_response: model.provider_response,
            created_at: model.created_at,
            sent_at: model.sent_at,
            retry_count: model.retry_count,
            max_retries: model.max_retries,
            version: model.version,
        })
    }
}

impl From<&Notification> for ActiveModel {
    fn from(n: &Notification) -> Self {
        ActiveModel {
            id: Set(n.id.clone()),
            kind: Set(n.kind.to_string()),
            recipient_id: Set(n.recipient.id.clone()),
            recipient_email: Set(n.recipient.email.clone()),
            recipient_phone: Set(n.recipient.phone.clone()),
            recipient_device: Set(n.recipient.device_id.clone()),
            title: Set(n.content.title.clone()),
            body: Set(n.content.body.clone()),
            data: Set(n.content.data.clone()),
            html: Set(n.content.html.clone()),
            template: Set(n.content.template.clone()),
            status: Set(n.status.to_string()),
            provider_response: Set(n.provider_response.clone()),
            created_at: Set(n.created_at),
            sent_at: Set(n.sent_at),
            retry_count: Set(n.retry_count),
            max_retries: Set(n.max_retries),
            version: Set(n.version),
        }
    }
}
