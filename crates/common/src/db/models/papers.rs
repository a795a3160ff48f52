//! Paper entity

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::records::Paper;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Ordered author names as a JSON array
    #[sea_orm(column_type = "Json")]
    pub authors: Json,

    pub publish_date: Date,

    pub update_date: Date,

    #[sea_orm(column_type = "Text")]
    pub pdf_url: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub code_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_text: Option<String>,

    pub category: String,

    pub citation_count: Option<i64>,

    pub influential_citation_count: Option<i64>,

    #[sea_orm(nullable)]
    pub venue: Option<String>,

    pub publication_year: Option<i32>,

    #[sea_orm(column_type = "Json", nullable)]
    pub affiliations: Option<Json>,

    pub supplement_updated_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn string_list(value: Json) -> Vec<String> {
    serde_json::from_value(value).unwrap_or_default()
}

impl From<Model> for Paper {
    fn from(m: Model) -> Self {
        Paper {
            id: m.id,
            title: m.title,
            authors: string_list(m.authors),
            publish_date: m.publish_date,
            update_date: m.update_date,
            pdf_url: m.pdf_url,
            code_url: m.code_url,
            abstract_text: m.abstract_text,
            category: m.category,
            citation_count: m.citation_count,
            influential_citation_count: m.influential_citation_count,
            venue: m.venue,
            publication_year: m.publication_year,
            affiliations: m.affiliations.map(string_list),
            supplement_updated_at: m.supplement_updated_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&Paper> for ActiveModel {
    fn from(p: &Paper) -> Self {
        ActiveModel {
            id: Set(p.id.clone()),
            title: Set(p.title.clone()),
            authors: Set(Json::from(p.authors.clone())),
            publish_date: Set(p.publish_date),
            update_date: Set(p.update_date),
            pdf_url: Set(p.pdf_url.clone()),
            code_url: Set(p.code_url.clone()),
            abstract_text: Set(p.abstract_text.clone()),
            category: Set(p.category.clone()),
            citation_count: Set(p.citation_count),
            influential_citation_count: Set(p.influential_citation_count),
            venue: Set(p.venue.clone()),
            publication_year: Set(p.publication_year),
            affiliations: Set(p.affiliations.clone().map(Json::from)),
            supplement_updated_at: Set(p.supplement_updated_at),
            created_at: Set(p.created_at),
            updated_at: Set(p.updated_at),
        }
    }
}
