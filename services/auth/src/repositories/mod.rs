//! Authentication service repositories

pub mod role;
pub mod token;
pub mod user;

pub use role::RoleRepository;
pub use token::TokenRepository;
pub use user::UserRepository;
