//! Job posting entity

use sea_orm::entity::prelude::*;
use sea_orm::{NotSet, Set};
use serde::{Deserialize, Serialize};

use crate::records::JobPosting;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// SHA-256 of `link|source_date` or `title|source_date`
    #[sea_orm(unique)]
    pub dedup_key: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(nullable)]
    pub company: Option<String>,

    #[sea_orm(nullable)]
    pub location: Option<String>,

    #[sea_orm(nullable)]
    pub job_type: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub link: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub source_date: String,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for JobPosting {
    fn from(m: Model) -> Self {
        JobPosting {
            id: m.id,
            title: m.title,
            company: m.company,
            location: m.location,
            job_type: m.job_type,
            link: m.link,
            description: m.description,
            source_date: m.source_date,
            created_at: m.created_at,
        }
    }
}

impl From<&JobPosting> for ActiveModel {
    fn from(j: &JobPosting) -> Self {
        ActiveModel {
            id: NotSet,
            dedup_key: Set(j.dedup_key()),
            title: Set(j.title.clone()),
            company: Set(j.company.clone()),
            location: Set(j.location.clone()),
            job_type: Set(j.job_type.clone()),
            link: Set(j.link.clone()),
            description: Set(j.description.clone()),
            source_date: Set(j.source_date.clone()),
            created_at: Set(j.created_at),
        }
    }
}
