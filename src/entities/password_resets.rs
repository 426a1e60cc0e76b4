use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "password_resets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Row id inside the table selected by `user_role`.
    pub user_id: i32,

    /// One of `admin`, `staff`, `student`.
    pub user_role: String,

    /// Destination address at request time.
    pub email: String,

    pub code: String,

    pub expires_at: ChronoDateTimeUtc,

    pub is_used: bool,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
