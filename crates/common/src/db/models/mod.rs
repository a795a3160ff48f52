//! SeaORM entity models
//!
//! Each entity converts to and from its record type in `crate::records`;
//! nothing outside `db` sees a `Model` or `ActiveModel`.

pub mod channels;
pub mod jobs;
pub mod news;
pub mod papers;
pub mod videos;

pub use papers::{
    ActiveModel as PaperActiveModel, Column as PaperColumn, Entity as PaperEntity,
    Model as PaperModel,
};

pub use news::{
    ActiveModel as NewsActiveModel, Column as NewsColumn, Entity as NewsEntity,
    Model as NewsModel,
};

pub use jobs::{
    ActiveModel as JobActiveModel, Column as JobColumn, Entity as JobEntity, Model as JobModel,
};

pub use channels::{
    ActiveModel as ChannelActiveModel, Column as ChannelColumn, Entity as ChannelEntity,
    Model as ChannelModel,
};

pub use videos::{
    ActiveModel as VideoActiveModel, Column as VideoColumn, Entity as VideoEntity,
    Model as VideoModel,
};
