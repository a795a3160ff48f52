//! News entity

use sea_orm::entity::prelude::*;
use sea_orm::{NotSet, Set};
use serde::{Deserialize, Serialize};

use crate::records::NewsItem;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "news")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// SHA-256 of the normalized link (or title when no link)
    #[sea_orm(unique)]
    pub dedup_key: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub link: String,

    pub source: String,

    pub platform: String,

    #[sea_orm(nullable)]
    pub author: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub image_url: Option<String>,

    #[sea_orm(column_type = "Json")]
    pub tags: Json,

    pub published_at: DateTimeUtc,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for NewsItem {
    fn from(m: Model) -> Self {
        NewsItem {
            id: m.id,
            title: m.title,
            link: m.link,
            source: m.source,
            platform: m.platform,
            author: m.author,
            description: m.description,
            image_url: m.image_url,
            tags: serde_json::from_value(m.tags).unwrap_or_default(),
            published_at: m.published_at,
            created_at: m.created_at,
        }
    }
}

impl From<&NewsItem> for ActiveModel {
    fn from(n: &NewsItem) -> Self {
        ActiveModel {
            id: NotSet,
            dedup_key: Set(n.dedup_key()),
            title: Set(n.title.clone()),
            link: Set(n.link.clone()),
            source: Set(n.source.clone()),
            platform: Set(n.platform.clone()),
            author: Set(n.author.clone()),
            description: Set(n.description.clone()),
            image_url: Set(n.image_url.clone()),
            tags: Set(Json::from(n.tags.iter().cloned().collect::<Vec<_>>())),
            published_at: Set(n.published_at),
            created_at: Set(n.created_at),
        }
    }
}
