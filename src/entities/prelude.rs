pub use super::users::Entity as Users;
pub use super::watches::Entity as Watches;
