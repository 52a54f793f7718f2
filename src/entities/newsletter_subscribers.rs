use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "newsletter_subscribers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub email: String,

    pub name: Option<String>,

    /// "active" or "unsubscribed"
    pub status: String,

    /// Which form captured the lead ("website", "footer", ...)
    pub source: String,

    pub ip_address: Option<String>,

    pub subscription_date: String,

    pub unsubscription_date: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
