//! Database entities

pub mod access_token;
pub mod user;

pub use access_token::Entity as AccessToken;
pub use user::Entity as User;

pub mod prelude {
    pub use super::access_token::Entity as AccessToken;
    pub use super::user::Entity as User;
}
