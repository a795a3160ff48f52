//! Video entity

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::records::Video;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "videos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub bvid: String,

    pub uid: i64,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    pub play: i64,
    pub reviews: i64,
    pub favorites: i64,

    pub play_short: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub cover_url: Option<String>,

    pub pubdate: DateTimeUtc,

    pub is_deleted: bool,

    pub updated_at: DateTimeUtc,
}

// No foreign key: videos may arrive before their channel row.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Video {
    fn from(m: Model) -> Self {
        Video {
            bvid: m.bvid,
            uid: m.uid,
            title: m.title,
            play: m.play,
            reviews: m.reviews,
            favorites: m.favorites,
            play_short: m.play_short,
            cover_url: m.cover_url,
            pubdate: m.pubdate,
            is_deleted: m.is_deleted,
            updated_at: m.updated_at,
        }
    }
}

impl From<&Video> for ActiveModel {
    fn from(v: &Video) -> Self {
        ActiveModel {
            bvid: Set(v.bvid.clone()),
            uid: Set(v.uid),
            title: Set(v.title.clone()),
            play: Set(v.play),
            reviews: Set(v.reviews),
            favorites: Set(v.favorites),
            play_short: Set(v.play_short.clone()),
            cover_url: Set(v.cover_url.clone()),
            pubdate: Set(v.pubdate),
            is_deleted: Set(v.is_deleted),
            updated_at: Set(v.updated_at),
        }
    }
}
