//! Video channel entity

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::records::{ChannelCounters, ChannelShortForms, VideoChannel};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: i64,

    pub name: String,

    pub fans: i64,
    pub videos_count: i64,
    pub views_count: i64,
    pub likes_count: i64,

    pub fans_short: String,
    pub videos_count_short: String,
    pub views_count_short: String,
    pub likes_count_short: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub face_url: Option<String>,

    pub last_fetch_at: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Text", nullable)]
    pub last_fetch_error: Option<String>,

    pub is_active: bool,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for VideoChannel {
    fn from(m: Model) -> Self {
        VideoChannel {
            uid: m.uid,
            name: m.name,
            counters: ChannelCounters {
                fans: m.fans,
                videos_count: m.videos_count,
                views_count: m.views_count,
                likes_count: m.likes_count,
            },
            short: ChannelShortForms {
                fans: m.fans_short,
                videos_count: m.videos_count_short,
                views_count: m.views_count_short,
                likes_count: m.likes_count_short,
            },
            face_url: m.face_url,
            last_fetch_at: m.last_fetch_at,
            last_fetch_error: m.last_fetch_error,
            is_active: m.is_active,
            updated_at: m.updated_at,
        }
    }
}

impl From<&VideoChannel> for ActiveModel {
    fn from(c: &VideoChannel) -> Self {
        ActiveModel {
            uid: Set(c.uid),
            name: Set(c.name.clone()),
            fans: Set(c.counters.fans),
            videos_count: Set(c.counters.videos_count),
            views_count: Set(c.counters.views_count),
            likes_count: Set(c.counters.likes_count),
            fans_short: Set(c.short.fans.clone()),
            videos_count_short: Set(c.short.videos_count.clone()),
            views_count_short: Set(c.short.views_count.clone()),
            likes_count_short: Set(c.short.likes_count.clone()),
            face_url: Set(c.face_url.clone()),
            last_fetch_at: Set(c.last_fetch_at),
            last_fetch_error: Set(c.last_fetch_error.clone()),
            is_active: Set(c.is_active),
            updated_at: Set(c.updated_at),
        }
    }
}
